//! Shared context for launch job handlers

use crate::config;
use crate::control::ControlPlane;

pub struct DispatchContext {
    pub control: ControlPlane,
    pub producer_bin: String,
    pub consumer_bin: String,
}

impl DispatchContext {
    pub fn new(control: ControlPlane) -> Self {
        Self {
            control,
            producer_bin: config::get_producer_bin(),
            consumer_bin: config::get_consumer_bin(),
        }
    }
}
