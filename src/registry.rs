//! Process-wide service registry.
//!
//! The control layer reaches the live service through a named, owning
//! handle instead of a global pointer. Registering constructs the service;
//! deregistering (or registering a replacement) disposes it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lazy_static::lazy_static;
use log::{info, warn};

use crate::service::{HmdService, Service};

/// Name the HMD postprocess service registers under.
pub const SERVICE_NAME: &str = "HmdPostprocessService";

pub type ServiceHandle = Arc<Mutex<HmdService>>;

lazy_static! {
    static ref SERVICES: Mutex<HashMap<String, ServiceHandle>> = Mutex::new(HashMap::new());
}

fn services() -> MutexGuard<'static, HashMap<String, ServiceHandle>> {
    SERVICES.lock().unwrap_or_else(PoisonError::into_inner)
}

fn dispose(name: &str, handle: ServiceHandle) {
    handle
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .dispose();
    info!("Service {} deregistered", name);
}

/// Constructs a service with `allocator` and installs it under `name`.
/// An instance already registered under that name is disposed.
pub fn register_service<F>(name: &str, allocator: F) -> ServiceHandle
where
    F: FnOnce() -> HmdService,
{
    let handle = Arc::new(Mutex::new(allocator()));
    let previous = services().insert(name.to_string(), handle.clone());
    if let Some(previous) = previous {
        warn!("Service {} already registered, replacing it", name);
        dispose(name, previous);
    }
    info!("Service {} registered", name);
    handle
}

/// Removes and disposes the service under `name`. Returns whether one was
/// registered.
pub fn deregister_service(name: &str) -> bool {
    let removed = services().remove(name);
    match removed {
        Some(handle) => {
            dispose(name, handle);
            true
        }
        None => false,
    }
}

pub fn is_registered(name: &str) -> bool {
    services().contains_key(name)
}

/// Whether the HMD postprocess service is active.
pub fn is_enabled() -> bool {
    is_registered(SERVICE_NAME)
}

pub fn get_named(name: &str) -> Option<ServiceHandle> {
    services().get(name).cloned()
}

/// The active HMD postprocess service.
pub fn get_service() -> Option<ServiceHandle> {
    get_named(SERVICE_NAME)
}
