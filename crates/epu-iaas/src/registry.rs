use std::collections::HashMap;
use std::sync::Arc;

use epu_domain::Site;

use crate::driver::Driver;
use crate::error::DriverError;

/// Maps each configured site to the driver instance that serves it. The
/// Provisioner groups nodes by site precisely so it can look one up here
/// and batch the call.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<Site, Arc<dyn Driver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, site: Site, driver: Arc<dyn Driver>) -> &mut Self {
        self.drivers.insert(site, driver);
        self
    }

    pub fn for_site(&self, site: &Site) -> Result<Arc<dyn Driver>, DriverError> {
        self.drivers
            .get(site)
            .cloned()
            .ok_or_else(|| DriverError::DriverNotConfigured(site.0.clone()))
    }

    pub fn sites(&self) -> Vec<Site> {
        self.drivers.keys().cloned().collect()
    }
}
