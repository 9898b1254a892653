//! Container image references: parsing, digest resolution and the digest
//! pinning policy.

mod reference;
mod resolver;

pub use reference::{
    DEFAULT_TAG, DOCKER_HUB_HOST, Digest, ImageReference, ParsedReference, split_registry,
};
pub use resolver::{enforce, resolve};
