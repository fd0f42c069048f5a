//! Method handlers.
//!
//! Each handler is a thin shim: check what the caller may do, delegate
//! to the domain collaborator, encode the result. The account methods
//! (`authorize`, `login`, `account.create`) are not here — they mutate
//! session state and are handled inline by the session loop.

mod media;
mod user;

use crate::registry::MethodRegistry;
use confab_proto::inquiries::methods;

pub use media::{DownloadMediaHandler, UploadMediaHandler, upload_aux_size};
pub use user::{ChangeEmailHandler, GetEmailHandler, GetOwnUserHandler};

/// The registry with every business handler wired in.
#[must_use]
pub fn build_registry() -> MethodRegistry {
    let mut registry = MethodRegistry::new();
    registry.register(methods::GET_OWN_USER, GetOwnUserHandler);
    registry.register(methods::GET_EMAIL, GetEmailHandler);
    registry.register(methods::CHANGE_EMAIL, ChangeEmailHandler);
    registry.register_with_aux(methods::UPLOAD_MEDIA, UploadMediaHandler, upload_aux_size);
    registry.register(methods::DOWNLOAD_MEDIA, DownloadMediaHandler);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_the_business_surface() {
        let registry = build_registry();
        for method in [
            methods::GET_OWN_USER,
            methods::GET_EMAIL,
            methods::CHANGE_EMAIL,
            methods::UPLOAD_MEDIA,
            methods::DOWNLOAD_MEDIA,
        ] {
            assert!(registry.has_method(method), "missing {method}");
        }
        // Account methods live in the session loop, not the registry.
        assert!(!registry.has_method(methods::AUTHORIZE));
        assert!(!registry.has_method(methods::LOGIN));
        assert!(!registry.has_method(methods::CREATE_ACCOUNT));
    }
}
