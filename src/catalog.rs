//! ## Resource Catalog
//!
//! The resources found by the single discovery pass at startup.
//!

use std::ops::Index;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::transport::Transport;
use crate::types::ResourceDescriptor;

/// Ordered, read-only list of reachable resources. The index of a resource is
/// the key an operator selects it by and never changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceCatalog {
    resources: Vec<ResourceDescriptor>,
}

impl ResourceCatalog {
    /// ### Discover
    ///
    /// Ask the transport for every resource, then open and immediately close a
    /// session to each one. Only resources that open are catalogued.
    ///
    /// A failed enumeration is a [`Error::Discovery`]; the catalog is never
    /// silently cut short.
    ///
    pub fn discover<T: Transport>(transport: &mut T) -> Result<Self> {
        let found = transport.discover().map_err(Error::Discovery)?;
        info!(count = found.len(), "resources found");

        let mut resources = Vec::with_capacity(found.len());
        for resource in found {
            match transport.open(&resource) {
                Ok(handle) => {
                    if let Err(err) = transport.close(handle) {
                        warn!(%resource, error = %err, "closing validation session failed");
                    }
                    info!(index = resources.len(), %resource, "resource catalogued");
                    resources.push(resource);
                }
                Err(err) => {
                    warn!(%resource, status = ?err.code(), error = %err, "resource did not open, skipped");
                }
            }
        }

        Ok(ResourceCatalog { resources })
    }

    pub fn from_resources(resources: Vec<ResourceDescriptor>) -> Self {
        ResourceCatalog { resources }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ResourceDescriptor> {
        self.resources.get(index)
    }

    /// `(index, descriptor)` pairs in selection order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ResourceDescriptor)> {
        self.resources.iter().enumerate()
    }
}

impl Index<usize> for ResourceCatalog {
    type Output = ResourceDescriptor;

    fn index(&self, index: usize) -> &ResourceDescriptor {
        &self.resources[index]
    }
}
