use rbac_engine::authz::types::{DESTINATION_PORT, PATH, SOURCE_IP, SOURCE_PRINCIPAL};
use std::collections::HashMap;

/// Builder for request attribute maps
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    attrs: HashMap<String, String>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default().header("x-request-id", "123456")
    }

    pub fn path(self, path: &str) -> Self {
        self.header(PATH, path)
    }

    pub fn principal(self, principal: &str) -> Self {
        self.header(SOURCE_PRINCIPAL, principal)
    }

    pub fn source_ip(self, ip: &str) -> Self {
        self.header(SOURCE_IP, ip)
    }

    pub fn destination_port(self, port: u16) -> Self {
        self.header(DESTINATION_PORT, &port.to_string())
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.attrs.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> HashMap<String, String> {
        self.attrs
    }
}
