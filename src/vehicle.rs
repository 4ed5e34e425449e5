//! Shared vehicle state.
//!
//! [`VehicleState`] is a plain record. It is shared between the wake loop,
//! sessions, typed commands and external observers through a
//! [`SharedVehicle`] handle, which serializes writers behind one mutex.
//! Every write is a short critical section: no caller holds the lock across
//! an await point or a blocking call.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Lowest accepted cabin temperature (°C).
pub const MIN_AC_TEMP: i32 = 16;
/// Highest accepted cabin temperature (°C).
pub const MAX_AC_TEMP: i32 = 30;

/// Window position for a fully closed window.
pub const WINDOW_CLOSED: u8 = 0;
/// Window position for a fully open window.
pub const WINDOW_OPEN: u8 = 100;

/// A controllable side window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    Driver,
    Passenger,
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver => f.write_str("driver"),
            Self::Passenger => f.write_str("passenger"),
        }
    }
}

/// Positions of both side windows. Each value is exactly 0 or 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Windows {
    pub driver: u8,
    pub passenger: u8,
}

impl Default for Windows {
    fn default() -> Self {
        Self {
            driver: WINDOW_CLOSED,
            passenger: WINDOW_CLOSED,
        }
    }
}

impl Windows {
    /// Set one window fully open or fully closed.
    pub fn set(&mut self, window: Window, open: bool) {
        let position = if open { WINDOW_OPEN } else { WINDOW_CLOSED };
        match window {
            Window::Driver => self.driver = position,
            Window::Passenger => self.passenger = position,
        }
    }

    pub fn get(&self, window: Window) -> u8 {
        match window {
            Window::Driver => self.driver,
            Window::Passenger => self.passenger,
        }
    }
}

/// The vehicle's controllable and observable attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleState {
    pub ac_on: bool,
    /// Always within [`MIN_AC_TEMP`]..=[`MAX_AC_TEMP`].
    pub ac_temp: i32,
    pub destination: Option<String>,
    pub lights_on: bool,
    pub wipers_on: bool,
    /// Simulated; never written by the command pipeline.
    pub speed: i32,
    /// Simulated fuel level in percent; never written by the command pipeline.
    pub fuel: i32,
    pub windows: Windows,
    /// True only while the assistant is speaking.
    pub ai_talking: bool,
    /// True only while a session is capturing or transcribing.
    pub is_listening: bool,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            ac_on: false,
            ac_temp: 22,
            destination: None,
            lights_on: false,
            wipers_on: false,
            speed: 0,
            fuel: 85,
            windows: Windows::default(),
            ai_talking: false,
            is_listening: false,
        }
    }
}

impl VehicleState {
    /// Store a cabin temperature, clamped to the supported range.
    ///
    /// Returns the value actually stored.
    pub fn set_ac_temp(&mut self, celsius: i64) -> i32 {
        let clamped = celsius.clamp(i64::from(MIN_AC_TEMP), i64::from(MAX_AC_TEMP));
        // In range after the clamp above.
        self.ac_temp = clamped as i32;
        self.ac_temp
    }
}

/// Cloneable handle to the one shared [`VehicleState`].
#[derive(Debug, Clone, Default)]
pub struct SharedVehicle {
    inner: Arc<Mutex<VehicleState>>,
}

impl SharedVehicle {
    pub fn new(state: VehicleState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Copy of the current state for observers.
    pub fn snapshot(&self) -> VehicleState {
        self.lock().clone()
    }

    /// Apply `f` atomically with respect to every other writer.
    pub fn update<R>(&self, f: impl FnOnce(&mut VehicleState) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    pub fn set_listening(&self, listening: bool) {
        self.update(|s| s.is_listening = listening);
    }

    pub fn set_ai_talking(&self, talking: bool) {
        self.update(|s| s.ai_talking = talking);
    }

    // A panicking writer cannot leave a half-written field: every update is
    // a plain store, so the poisoned value is still consistent.
    fn lock(&self) -> MutexGuard<'_, VehicleState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
