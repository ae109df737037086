//! Per-query scratch space.
//!
//! The region field writes the region, the vpc field below it writes the vpc,
//! and leaf resolvers read both. One context per inbound query; it is owned by
//! the executor and dropped with the request.

use compost_shared::CompostError;

#[derive(Debug, Default)]
pub struct RequestContext {
    region: Option<String>,
    vpc: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_region(&mut self, region: &str) -> Result<(), CompostError> {
        if region.is_empty() {
            return Err(CompostError::MissingRegion);
        }
        self.region = Some(region.to_string());
        Ok(())
    }

    pub fn set_vpc(&mut self, vpc: &str) -> Result<(), CompostError> {
        if vpc.is_empty() {
            return Err(CompostError::MissingVpc);
        }
        self.vpc = Some(vpc.to_string());
        Ok(())
    }

    pub fn region(&self) -> Result<&str, CompostError> {
        self.region.as_deref().ok_or(CompostError::MissingRegion)
    }

    pub fn vpc(&self) -> Result<&str, CompostError> {
        self.vpc.as_deref().ok_or(CompostError::MissingVpc)
    }
}
