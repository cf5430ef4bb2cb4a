//! SPIR-V shader modules.
//!
//! Bytecode is compiled offline (`glslc`) and loaded as-is; the only checks
//! are the ones Vulkan would otherwise fail on less clearly: word alignment
//! and the SPIR-V magic number.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::shader::{Shader, ShaderStage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
//! let vertex_shader = Shader::from_spirv_file(
//!     device.clone(),
//!     Path::new("shaders/vert.spv"),
//!     ShaderStage::Vertex,
//!     "main",
//! )?;
//! let _vertex_stage_info = vertex_shader.stage_create_info();
//! # Ok(())
//! # }
//! ```

use std::ffi::{CStr, CString};
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// First word of every SPIR-V module.
const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Pipeline stage a module is written for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        })
    }
}

/// Decodes a SPIR-V blob into words.
///
/// # Errors
///
/// Returns [`RhiError::ShaderError`] if the blob is empty, misaligned, or
/// does not start with the SPIR-V magic number.
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    let words = ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| RhiError::ShaderError(format!("Malformed SPIR-V ({} bytes): {}", bytes.len(), e)))?;

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&other) => Err(RhiError::ShaderError(format!(
            "Not SPIR-V: magic number {:#010x}",
            other
        ))),
        None => Err(RhiError::ShaderError("Empty SPIR-V module".to_string())),
    }
}

/// A shader module plus the stage and entry point it is bound with.
///
/// Only has to outlive the pipeline creation that consumes it.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: CString,
}

impl Shader {
    /// Reads and loads a `.spv` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, or for anything
    /// [`Shader::from_spirv_bytes`] rejects.
    pub fn from_spirv_file(
        device: Arc<Device>,
        path: &Path,
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("Cannot read {} shader {}: {}", stage, path.display(), e))
        })?;
        debug!("Read {} bytes of {} shader from {}", bytes.len(), stage, path.display());

        Self::from_spirv_bytes(device, &bytes, stage, entry_point)
    }

    /// Creates the module from in-memory SPIR-V.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not SPIR-V, the entry point contains
    /// a NUL, or module creation fails.
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        let code = spirv_words(bytes)?;
        let entry_point = CString::new(entry_point)
            .map_err(|e| RhiError::ShaderError(format!("Bad entry point name: {}", e)))?;

        let module = unsafe {
            device
                .handle()
                .create_shader_module(&vk::ShaderModuleCreateInfo::default().code(&code), None)?
        };
        info!("{} shader module ready ({} words)", stage, code.len());

        Ok(Self {
            device,
            module,
            stage,
            entry_point,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    #[inline]
    pub fn entry_point(&self) -> &CStr {
        &self.entry_point
    }

    /// Stage description for pipeline creation; borrows from this shader.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(&self.entry_point)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_shader_module(self.module, None) };
        debug!("{} shader module destroyed", self.stage);
    }
}
