//! Entry point generation.

/// Export an extension type from a module.
///
/// Emits the two symbols the host resolves by name:
/// - `nonbiri_extension_init`, which stores the host's capability table for
///   [`http`](crate::http) and returns [`ABI_VERSION`](crate::ABI_VERSION)
/// - `nonbiri_extension_create`, which calls the constructor and hands the
///   boxed instance to the host, or null if the constructor panicked
///
/// # Example
///
/// ```rust,ignore
/// use nonbiri_extension_sdk::prelude::*;
///
/// export_extension!(MySource::new);
/// ```
#[macro_export]
macro_rules! export_extension {
    ($ctor:expr) => {
        #[no_mangle]
        pub unsafe extern "C" fn nonbiri_extension_init(
            capabilities: *const $crate::Capabilities,
        ) -> u32 {
            // SAFETY: the host passes a pointer that is valid for this call.
            if let Some(capabilities) = unsafe { capabilities.as_ref() } {
                $crate::http::install(capabilities.clone());
            }
            $crate::ABI_VERSION
        }

        #[no_mangle]
        pub extern "C" fn nonbiri_extension_create() -> *mut Box<dyn $crate::Extension> {
            match std::panic::catch_unwind(|| {
                let instance: Box<dyn $crate::Extension> = Box::new(($ctor)());
                instance
            }) {
                Ok(instance) => Box::into_raw(Box::new(instance)),
                Err(_) => std::ptr::null_mut(),
            }
        }
    };
}
