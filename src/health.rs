//! Process health flag and the `/health` probe.
//!
//! | State | `GET /health` |
//! |---|---|
//! | Up   | `204 No Content` |
//! | Down | `503 Service Unavailable` |
//!
//! [`Health`] starts Down. The lifecycle manager flips it Up once the
//! listener is bound and back Down the moment a shutdown is triggered, so a
//! load balancer stops routing here before connections start draining.
//! This is a liveness probe only; it checks nothing downstream.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use http::StatusCode;

use crate::response::Response;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthState {
    Down,
    Up,
}

/// Shared two-state health cell. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct Health(Arc<AtomicBool>);

impl Health {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> HealthState {
        if self.0.load(Ordering::Acquire) { HealthState::Up } else { HealthState::Down }
    }

    pub fn is_up(&self) -> bool {
        self.state() == HealthState::Up
    }

    pub fn set(&self, state: HealthState) {
        self.0.store(state == HealthState::Up, Ordering::Release);
    }

    /// The probe response for the current state. Never has a body.
    pub fn probe(&self) -> Response {
        match self.state() {
            HealthState::Up => Response::status(StatusCode::NO_CONTENT),
            HealthState::Down => Response::status(StatusCode::SERVICE_UNAVAILABLE),
        }
    }
}
