//! Pod identity and container images as seen by the validator.

use k8s_openapi::api::core::v1::{Container, EphemeralContainer, Pod};

/// A container and the raw image string it references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerImage {
    pub name: String,
    pub image: String,
}

impl ContainerImage {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
        }
    }
}

impl From<&Container> for ContainerImage {
    fn from(container: &Container) -> Self {
        Self {
            name: container.name.clone(),
            image: container.image.clone().unwrap_or_default(),
        }
    }
}

impl From<&EphemeralContainer> for ContainerImage {
    fn from(container: &EphemeralContainer) -> Self {
        Self {
            name: container.name.clone(),
            image: container.image.clone().unwrap_or_default(),
        }
    }
}

/// The parts of a pod the admission decision depends on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodContext {
    /// Display name, for diagnostics only
    pub name: String,
    /// Containers in the order they are validated
    pub containers: Vec<ContainerImage>,
}

impl PodContext {
    pub fn new(name: impl Into<String>, containers: Vec<ContainerImage>) -> Self {
        Self {
            name: name.into(),
            containers,
        }
    }

    /// Extract the context from a pod.
    ///
    /// Init containers come first since they run first. Ephemeral containers
    /// (`kubectl debug`) come last.
    pub fn from_pod(pod: &Pod) -> Self {
        let name = display_name(
            pod.metadata.name.as_deref(),
            pod.metadata.generate_name.as_deref(),
        );

        let containers = pod
            .spec
            .as_ref()
            .map(|spec| {
                spec.init_containers
                    .iter()
                    .flatten()
                    .chain(spec.containers.iter())
                    .map(ContainerImage::from)
                    .chain(
                        spec.ephemeral_containers
                            .iter()
                            .flatten()
                            .map(ContainerImage::from),
                    )
                    .collect()
            })
            .unwrap_or_default();

        Self { name, containers }
    }
}

/// Pod name, else the generate-name prefix, else empty
pub fn display_name(name: Option<&str>, generate_name: Option<&str>) -> String {
    name.filter(|n| !n.is_empty())
        .or(generate_name.filter(|n| !n.is_empty()))
        .unwrap_or_default()
        .to_string()
}
