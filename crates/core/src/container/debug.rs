use crate::config::ContainerOptions;
use crate::container::descriptor::ServiceDescriptor;
use crate::container::scope::ServiceLifetime;
use serde::Serialize;
use std::fmt::Write as _;

/// One registration as seen by diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationInfo {
    pub id: usize,
    pub contract: String,
    /// Implementation type name, or "factory"
    pub implementation: String,
    pub lifetime: ServiceLifetime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Whether single resolution of the contract uses this registration
    pub active: bool,
    pub dependencies: Vec<String>,
}

impl RegistrationInfo {
    pub(crate) fn from_descriptor(descriptor: &ServiceDescriptor, active: bool) -> Self {
        Self {
            id: descriptor.id().index(),
            contract: descriptor.service_id().type_name().to_string(),
            implementation: descriptor.implementation_name().to_string(),
            lifetime: descriptor.lifetime(),
            key: descriptor.key().map(str::to_string),
            active,
            dependencies: descriptor
                .dependencies()
                .iter()
                .map(|parameter| parameter.service_id.type_name().to_string())
                .collect(),
        }
    }
}

/// Serializable snapshot of a container
#[derive(Debug, Clone, Serialize)]
pub struct ContainerDescription {
    pub registrations: Vec<RegistrationInfo>,
    pub cached_singletons: usize,
    pub tracked_disposables: usize,
    pub disposed: bool,
    pub options: ContainerOptions,
}

impl ContainerDescription {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Registrations for a contract, matched by type name suffix
    pub fn registrations_for(&self, contract: &str) -> Vec<&RegistrationInfo> {
        self.registrations
            .iter()
            .filter(|registration| registration.contract.ends_with(contract))
            .collect()
    }

    /// Human-readable report
    pub fn report(&self) -> String {
        let mut report = String::new();
        let _ = writeln!(report, "=== Container Report ===");
        let _ = writeln!(report, "Registrations: {}", self.registrations.len());
        let _ = writeln!(report, "Cached singletons: {}", self.cached_singletons);
        let _ = writeln!(report, "Tracked disposables: {}", self.tracked_disposables);
        if self.disposed {
            let _ = writeln!(report, "Disposed: yes");
        }
        let _ = writeln!(report);

        for registration in &self.registrations {
            let _ = write!(
                report,
                "{} {} -> {} [{}]",
                if registration.active { "*" } else { " " },
                registration.contract,
                registration.implementation,
                registration.lifetime
            );
            if let Some(key) = &registration.key {
                let _ = write!(report, " key={}", key);
            }
            let _ = writeln!(report);
            for dependency in &registration.dependencies {
                let _ = writeln!(report, "    needs {}", dependency);
            }
        }

        report
    }
}

impl std::fmt::Display for ContainerDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.report())
    }
}
