// packages/agent/src/interception/location.rs
//! Location interceptor
//!
//! The simulated override lives in the standard key-value namespace under two
//! reserved keys. It is read on every query, so a change made by any caller is
//! visible to every other caller immediately.

use crate::capture::{CaptureStore, Coordinate, LocationQuery, LocationSource};
use crate::inspection::namespace::KeyValueNamespace;
use crate::interception::Interceptor;
use crate::redirect::{Original, RedirectionTable};
use crate::registry::features::InterceptorId;
use crate::utils::errors::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Entry point returning the current device position
pub const CURRENT_LOCATION: &str = "location.current";

/// Reserved key holding the simulated latitude
pub const SIMULATED_LATITUDE_KEY: &str = "_periscope.simulated_latitude";

/// Reserved key holding the simulated longitude
pub const SIMULATED_LONGITUDE_KEY: &str = "_periscope.simulated_longitude";

/// Reads and writes the simulated location override
#[derive(Clone)]
pub struct LocationToolkit {
    namespace: Arc<dyn KeyValueNamespace>,
}

impl LocationToolkit {
    pub fn new(namespace: Arc<dyn KeyValueNamespace>) -> Self {
        Self { namespace }
    }

    /// Override every subsequent location query
    pub fn simulate(&self, coordinate: Coordinate) {
        info!("Simulating location {}", coordinate);
        self.namespace
            .set(SIMULATED_LATITUDE_KEY, Value::from(coordinate.latitude));
        self.namespace
            .set(SIMULATED_LONGITUDE_KEY, Value::from(coordinate.longitude));
        self.namespace.synchronize();
    }

    /// Return to the real location
    pub fn clear_simulation(&self) {
        info!("Cleared simulated location");
        self.namespace.remove(SIMULATED_LATITUDE_KEY);
        self.namespace.remove(SIMULATED_LONGITUDE_KEY);
        self.namespace.synchronize();
    }

    /// Current override, if both keys hold numbers
    pub fn simulated(&self) -> Option<Coordinate> {
        let latitude = self.namespace.get(SIMULATED_LATITUDE_KEY)?.as_f64()?;
        let longitude = self.namespace.get(SIMULATED_LONGITUDE_KEY)?.as_f64()?;
        Some(Coordinate::new(latitude, longitude))
    }
}

/// Location interceptor
#[derive(Clone)]
pub struct LocationInterceptor {
    toolkit: LocationToolkit,
    store: Arc<CaptureStore<LocationQuery>>,
}

impl LocationInterceptor {
    pub fn new(toolkit: LocationToolkit, store: Arc<CaptureStore<LocationQuery>>) -> Self {
        Self { toolkit, store }
    }

    pub fn toolkit(&self) -> &LocationToolkit {
        &self.toolkit
    }

    fn resolve(&self, original: &Original<(), Option<Coordinate>>) -> Option<Coordinate> {
        let query = match self.toolkit.simulated() {
            Some(simulated) => LocationQuery {
                source: LocationSource::Simulated,
                coordinate: Some(simulated),
                simulated: Some(simulated),
            },
            None => LocationQuery {
                source: LocationSource::Real,
                coordinate: original.call(()),
                simulated: None,
            },
        };

        let coordinate = query.coordinate;
        self.store.append(query);
        coordinate
    }
}

impl Interceptor for LocationInterceptor {
    fn id(&self) -> InterceptorId {
        InterceptorId::Location
    }

    fn enable(&self, table: &RedirectionTable) -> Result<bool> {
        let interceptor = self.clone();
        let installed = table.install(
            CURRENT_LOCATION,
            InterceptorId::Location.as_str(),
            move |original: &Original<(), Option<Coordinate>>, _: ()| interceptor.resolve(original),
        )?;

        if installed {
            debug!("Location queries now consult the simulated override");
        }
        Ok(installed)
    }
}
