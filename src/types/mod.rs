// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Resource and bucket names, remote URIs, image references, run/plan IDs.

mod bucket_name;
mod id;
mod image_ref;
mod remote_uri;
mod resource_name;

pub use bucket_name::{BucketName, BucketNameError};
pub use id::{Id, PlanId, RunId};
pub use image_ref::{ImageRef, ParseImageRefError};
pub use remote_uri::{ParseRemoteUriError, RemoteKey, RemoteUri};
pub use resource_name::{ResourceName, ResourceNameError};
