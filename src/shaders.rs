//! Shader templates and shader compilers.
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

use erupt::vk;
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing1::{debug, error};

use crate::{CtsError, Result};

/// Environment variable that overrides the path of the `glslangValidator` binary.
pub const GLSLANG_VALIDATOR_ENV: &str = "GLSLANG_VALIDATOR";

/// Callables whose index is a multiple of this value carry extra work that doesn't change
/// their result.
pub const DUMMY_WORK_INTERVAL: u32 = 43;

const VERSION: &str = "#version 460 core";
const EXTENSION: &str = "#extension GL_EXT_ray_tracing : require";

const RAYGEN_TEMPLATE: &str = r#"${VERSION}
${EXTENSION}

layout(location = 0) callableDataEXT uvec4 payload;
layout(r32ui, set = 0, binding = 0) uniform uimage2D result;
layout(set = 0, binding = 1) uniform accelerationStructureEXT topLevelAS;

void main()
{
    uvec2 pixel = gl_LaunchIDEXT.xy;
    uint callableIndex = gl_LaunchSizeEXT.x * pixel.y + pixel.x;

    payload = uvec4(pixel, 0u, 0u);
    executeCallableEXT(callableIndex, 0);

    imageStore(result, ivec2(pixel), uvec4(payload.z, 0u, 0u, 1u));
}
"#;

const CALLABLE_TEMPLATE: &str = r#"${VERSION}
${EXTENSION}

layout(location = 0) callableDataInEXT uvec4 payload;

const uint callableIndex = ${INDEX}u;
const uint width = ${WIDTH}u;

void main()
{
    uint x = callableIndex % width;
    uint y = callableIndex / width;
    uint value = (width * (y / 3u) + x) % 199u;
${DUMMY_WORK}
    payload.z = value;
}
"#;

// The pixel coordinates are never 0xFFFFFFFF, so the branch is never taken.
const DUMMY_WORK: &str = r#"    uint dummy = payload.x;
    for (uint i = 0u; i < 256u; i++)
    {
        dummy = ((dummy * 1664525u + 1013904223u) ^ payload.y) + (dummy >> 7u);
    }
    if (dummy == 0xFFFFFFFFu && payload.x == 0xFFFFFFFFu)
    {
        value = dummy;
    }"#;

/// The shader stages of the pipeline.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// The ray generation shader.
    RayGeneration,
    /// A callable shader.
    Callable,
}

impl ShaderStage {
    /// The Vulkan stage flag.
    pub fn as_vk(self) -> vk::ShaderStageFlagBits {
        match self {
            ShaderStage::RayGeneration => vk::ShaderStageFlagBits::RAYGEN_KHR,
            ShaderStage::Callable => vk::ShaderStageFlagBits::CALLABLE_KHR,
        }
    }

    /// The file extension `glslangValidator` derives the stage from.
    pub fn file_extension(self) -> &'static str {
        match self {
            ShaderStage::RayGeneration => "rgen",
            ShaderStage::Callable => "rcall",
        }
    }
}

/// GLSL source of one shader with all placeholders substituted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderSource {
    /// Name used in diagnostics.
    pub name: String,
    /// The stage of the shader.
    pub stage: ShaderStage,
    /// The GLSL text.
    pub text: String,
}

impl ShaderSource {
    /// Creates a source from a template. `${VERSION}` and `${EXTENSION}` are always
    /// substituted, other `${KEY}` placeholders are taken from `substitutions`.
    pub fn from_template(
        name: impl Into<String>,
        stage: ShaderStage,
        template: &str,
        substitutions: &[(&str, &str)],
    ) -> Self {
        let mut all = vec![("VERSION", VERSION), ("EXTENSION", EXTENSION)];
        all.extend_from_slice(substitutions);

        Self {
            name: name.into(),
            stage,
            text: substitute(template, &all),
        }
    }
}

/// Replaces every `${KEY}` in `template` with its value. Unknown placeholders are kept.
pub fn substitute(template: &str, substitutions: &[(&str, &str)]) -> String {
    let mut text = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        text.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match substitutions.iter().find(|(k, _)| *k == key) {
                    Some((_, value)) => text.push_str(value),
                    None => text.push_str(&rest[start..start + 3 + end]),
                }
                rest = &after[end + 1..];
            }
            None => {
                text.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    text.push_str(rest);

    text
}

/// The ray generation shader. Every invocation calls the callable with its linear launch
/// index and stores the returned value into the output image.
pub fn raygen_shader_source() -> ShaderSource {
    ShaderSource::from_template("raygen", ShaderStage::RayGeneration, RAYGEN_TEMPLATE, &[])
}

/// The callable shader for the pixel with the linear index `index` of an image with the
/// given width. The shader derives its pixel and its value from its own index, so every
/// callable of a pipeline has a distinct source.
pub fn callable_shader_source(width: u32, index: u32) -> ShaderSource {
    let dummy_work = if index % DUMMY_WORK_INTERVAL == 0 {
        DUMMY_WORK
    } else {
        ""
    };

    ShaderSource::from_template(
        format!("callable_{}", index),
        ShaderStage::Callable,
        CALLABLE_TEMPLATE,
        &[
            ("INDEX", &index.to_string()),
            ("WIDTH", &width.to_string()),
            ("DUMMY_WORK", dummy_work),
        ],
    )
}

/// The shaders of a pipeline for a `width` x `height` image and the stage every shader group
/// executes.
///
/// Stage 0 and group 0 are the ray generation shader. Callable `i` is stage `i + 1` and is
/// executed by group `i + 1`, which is the record the ray generation shader selects for the
/// pixel with the linear index `i`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineShaders {
    /// One source per pipeline stage.
    pub sources: Vec<ShaderSource>,
    /// The general shader of every shader group, as an index into `sources`.
    pub group_stages: Vec<u32>,
}

impl PipelineShaders {
    /// Creates the ray generation shader and one callable per pixel.
    pub fn new(width: u32, height: u32) -> Self {
        let callable_count = width * height;

        let mut sources = Vec::with_capacity(callable_count as usize + 1);
        sources.push(raygen_shader_source());
        sources.extend((0..callable_count).map(|index| callable_shader_source(width, index)));

        Self {
            sources,
            group_stages: (0..=callable_count).collect(),
        }
    }

    /// Number of callable shaders.
    pub fn callable_count(&self) -> usize {
        self.sources.len() - 1
    }
}

/// Compiles GLSL into SPIR-V.
pub trait ShaderCompiler: Sync {
    /// Compiles one shader.
    fn compile(&self, source: &ShaderSource) -> Result<Vec<u32>>;
}

/// Compiles all sources in parallel. The output keeps the order of the input.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn compile_all<C: ShaderCompiler + ?Sized>(
    compiler: &C,
    sources: &[ShaderSource],
) -> Result<Vec<Vec<u32>>> {
    sources
        .par_iter()
        .map(|source| compiler.compile(source))
        .collect()
}

/// Compiles shaders by invoking the `glslangValidator` binary.
#[derive(Clone, Debug)]
pub struct GlslangCompiler {
    executable: PathBuf,
}

impl Default for GlslangCompiler {
    fn default() -> Self {
        let executable = std::env::var_os(GLSLANG_VALIDATOR_ENV)
            .unwrap_or_else(|| OsString::from("glslangValidator"));
        Self {
            executable: PathBuf::from(executable),
        }
    }
}

impl GlslangCompiler {
    /// Uses the binary given by `GLSLANG_VALIDATOR` or `glslangValidator` from `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the given binary.
    pub fn with_executable(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Returns true if the binary can be executed.
    pub fn is_available(&self) -> bool {
        Command::new(&self.executable)
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }
}

impl ShaderCompiler for GlslangCompiler {
    fn compile(&self, source: &ShaderSource) -> Result<Vec<u32>> {
        let dir = tempfile::tempdir()?;
        let input = dir
            .path()
            .join(format!("{}.{}", source.name, source.stage.file_extension()));
        let output = dir.path().join(format!("{}.spv", source.name));
        std::fs::write(&input, &source.text)?;

        let result = Command::new(&self.executable)
            .arg("-V")
            .arg("--target-env")
            .arg("vulkan1.2")
            .arg("-o")
            .arg(&output)
            .arg(&input)
            .output()
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    CtsError::NotSupported(format!(
                        "shader compiler {} not found",
                        self.executable.display()
                    ))
                } else {
                    CtsError::IoError(err)
                }
            })?;

        if !result.status.success() {
            let log = format!(
                "{}{}",
                String::from_utf8_lossy(&result.stdout),
                String::from_utf8_lossy(&result.stderr)
            );
            #[cfg(feature = "tracing")]
            error!("Unable to compile shader {}: {}", source.name, log);
            return Err(CtsError::ShaderCompilation {
                name: source.name.clone(),
                log,
            });
        }

        let bytes = std::fs::read(&output)?;
        let code = erupt::utils::decode_spv(&bytes)?;

        #[cfg(feature = "tracing")]
        debug!("Compiled shader {} into {} words", source.name, code.len());

        Ok(code)
    }
}

/// Compiles shaders in-process with shaderc.
#[cfg(feature = "shaderc")]
#[derive(Copy, Clone, Debug, Default)]
pub struct ShadercCompiler;

#[cfg(feature = "shaderc")]
impl ShaderCompiler for ShadercCompiler {
    fn compile(&self, source: &ShaderSource) -> Result<Vec<u32>> {
        let failure = |log: String| CtsError::ShaderCompilation {
            name: source.name.clone(),
            log,
        };

        #[allow(unused_mut)]
        let mut compiler = shaderc::Compiler::new()
            .ok_or_else(|| failure("shaderc compiler unavailable".to_owned()))?;
        let mut options = shaderc::CompileOptions::new()
            .ok_or_else(|| failure("shaderc options unavailable".to_owned()))?;
        options.set_target_env(
            shaderc::TargetEnv::Vulkan,
            shaderc::EnvVersion::Vulkan1_2 as u32,
        );
        options.set_target_spirv(shaderc::SpirvVersion::V1_4);

        let kind = match source.stage {
            ShaderStage::RayGeneration => shaderc::ShaderKind::RayGeneration,
            ShaderStage::Callable => shaderc::ShaderKind::Callable,
        };

        let artifact = compiler
            .compile_into_spirv(&source.text, kind, &source.name, "main", Some(&options))
            .map_err(|err| {
                #[cfg(feature = "tracing")]
                error!("Unable to compile shader {}: {}", source.name, err);
                failure(err.to_string())
            })?;

        Ok(artifact.as_binary().to_vec())
    }
}
