// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

/// Port the Telemetry API pushes to.
pub const DEFAULT_LISTENER_PORT: u16 = 4323;
/// Hostname the Lambda sandbox exposes to extensions.
pub const SANDBOX_HOSTNAME: &str = "sandbox";
/// Set by the SAM CLI when the function runs in the local emulator.
pub const SAM_LOCAL_ENV_VAR: &str = "AWS_SAM_LOCAL";
/// Grace period given to in-flight pushes when the listener stops.
pub const DEFAULT_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(1);

const ALL_INTERFACES: &str = "0.0.0.0";

/// Host part of the address the listener binds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindAddress {
    /// Every interface, used under the local emulator where `sandbox` does not resolve.
    AllInterfaces,
    /// A specific hostname or IP address.
    Host(String),
}

impl BindAddress {
    /// Picks the bind host from the value of [`SAM_LOCAL_ENV_VAR`].
    pub fn resolve(sam_local: Option<&str>) -> Self {
        match sam_local {
            Some(value) if is_true_like(value) => BindAddress::AllInterfaces,
            _ => BindAddress::Host(SANDBOX_HOSTNAME.to_string()),
        }
    }

    pub fn host(&self) -> &str {
        match self {
            BindAddress::AllInterfaces => ALL_INTERFACES,
            BindAddress::Host(host) => host,
        }
    }
}

/// `true`, `1`, `yes` and `on`, ignoring case and surrounding whitespace.
pub fn is_true_like(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    pub bind_address: BindAddress,
    pub port: u16,
    /// Deadline used by [`crate::TelemetryListener::shutdown`].
    pub shutdown_deadline: Duration,
}

impl ListenerConfig {
    /// Reads the execution context once from the process environment.
    pub fn from_env() -> Self {
        let sam_local = env::var(SAM_LOCAL_ENV_VAR).ok();
        Self::for_environment(sam_local.as_deref())
    }

    pub fn for_environment(sam_local: Option<&str>) -> Self {
        ListenerConfig {
            bind_address: BindAddress::resolve(sam_local),
            port: DEFAULT_LISTENER_PORT,
            shutdown_deadline: DEFAULT_SHUTDOWN_DEADLINE,
        }
    }

    /// `host:port` string handed to the socket layer.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address.host(), self.port)
    }

    /// URL to register with the Telemetry API as the delivery destination.
    pub fn endpoint_url(&self) -> String {
        format!("http://{}/", self.listen_address())
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::for_environment(None)
    }
}
