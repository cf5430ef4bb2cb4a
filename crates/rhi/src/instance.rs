//! Vulkan instance and validation routing.
//!
//! Validation is requested through [`InstanceDesc::enable_validation`] and is
//! honoured only when the Khronos layer is installed. When active, a
//! debug-utils messenger forwards layer messages into `tracing` at the
//! matching level; the same messenger settings are chained into instance
//! creation so messages from `vkCreateInstance` itself are not lost.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_rhi::instance::{Instance, InstanceDesc};
//!
//! // Headless instance with validation requested
//! let instance = Instance::new(&InstanceDesc {
//!     enable_validation: true,
//!     ..Default::default()
//! })
//! .expect("Failed to create Vulkan instance");
//!
//! let _entry = instance.entry();
//! ```

use std::borrow::Cow;
use std::ffi::{CStr, c_char};

use ash::{Entry, vk};
use tracing::{Level, debug, error, info, trace, warn};

use crate::error::RhiError;

const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance creation parameters.
#[derive(Clone, Debug, Default)]
pub struct InstanceDesc {
    /// Enables the validation layer and debug messenger when the layer is installed.
    pub enable_validation: bool,
    /// Surface extensions required by the windowing system. Empty for headless use.
    pub surface_extensions: Vec<*const c_char>,
}

/// Layer and extension names passed to `vkCreateInstance`.
fn enabled_names(
    desc: &InstanceDesc,
    validation: bool,
) -> (Vec<*const c_char>, Vec<*const c_char>) {
    let mut extensions = desc.surface_extensions.clone();
    let mut layers = Vec::new();
    if validation {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        layers.push(VALIDATION_LAYER_NAME.as_ptr());
    }
    (layers, extensions)
}

/// Messenger settings: warnings and errors of every message type.
fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

/// Installed debug-utils messenger and the loader that destroys it.
struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

/// Vulkan instance, plus the debug messenger when validation is active.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    debug: Option<DebugMessenger>,
}

impl Instance {
    /// Loads the Vulkan library and creates an instance.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Vulkan library cannot be loaded
    /// - A requested extension is unavailable
    /// - Instance or messenger creation fails
    pub fn new(desc: &InstanceDesc) -> Result<Self, RhiError> {
        let entry = unsafe { Entry::load()? };

        let validation = desc.enable_validation && Self::has_validation_layer(&entry)?;
        if desc.enable_validation && !validation {
            warn!("Validation requested but VK_LAYER_KHRONOS_validation is not installed");
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"vkframe")
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"vkframe")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let (layers, extensions) = enabled_names(desc, validation);
        let mut creation_messenger = messenger_create_info();

        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions);
        if validation {
            create_info = create_info.push_next(&mut creation_messenger);
        }

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        info!(
            "Vulkan instance created ({} extension(s), validation {})",
            extensions.len(),
            if validation { "on" } else { "off" }
        );

        let debug = if validation {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            match unsafe { loader.create_debug_utils_messenger(&messenger_create_info(), None) } {
                Ok(messenger) => Some(DebugMessenger { loader, messenger }),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            debug,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// True when the validation layer and messenger are active.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug.is_some()
    }

    fn has_validation_layer(entry: &Entry) -> Result<bool, RhiError> {
        let layers = unsafe { entry.enumerate_instance_layer_properties()? };
        Ok(layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER_NAME)))
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some(debug) = self.debug.take() {
                debug
                    .loader
                    .destroy_debug_utils_messenger(debug.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// `tracing` level for a validation message severity.
fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Level::ERROR
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Level::WARN
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        Level::INFO
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE) {
        Level::DEBUG
    } else {
        Level::TRACE
    }
}

fn message_type_label(kind: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if kind.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if kind.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

/// Forwards validation layer messages to `tracing`.
///
/// # Safety
///
/// Called by the loader with a callback-data pointer that is either null or
/// valid for the duration of the call.
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = match unsafe { callback_data.as_ref() } {
        Some(data) if !data.p_message.is_null() => unsafe {
            CStr::from_ptr(data.p_message).to_string_lossy()
        },
        _ => Cow::Borrowed("(no message)"),
    };
    let kind = message_type_label(kind);

    match severity_level(severity) {
        Level::ERROR => error!(target: "vulkan", kind, "{}", message),
        Level::WARN => warn!(target: "vulkan", kind, "{}", message),
        Level::INFO => info!(target: "vulkan", kind, "{}", message),
        Level::DEBUG => debug!(target: "vulkan", kind, "{}", message),
        _ => trace!(target: "vulkan", kind, "{}", message),
    }

    // Never abort the call that triggered the message.
    vk::FALSE
}
