#![warn(missing_docs)]
#![allow(clippy::missing_safety_doc)]
//! Vulkan ray tracing conformance checks for large acceleration structure builds and large
//! callable shader sets.
//!
//! A case builds a two-level acceleration structure on the host or on the device, compiles a
//! pipeline with one ray generation shader and `width * height` callable shaders, traces one
//! ray per pixel, reads the output image back and compares it against an analytic reference.
//! Host builds can be driven by a deferred operation that is joined by a configurable number
//! of worker threads; the runner executes a case with and without workers and requires both
//! runs to produce the reference image.

pub use {
    acceleration_structure::AccelerationStructure,
    arena::{Arena, Handle},
    bottom_level::{BottomLevelAccelerationStructure, BottomLevelBuilder},
    buffer::{Buffer, BufferDescriptor},
    capabilities::{check_support, required_memory_allocations, DeviceCapabilities},
    case::{build_large_cases, BuildType, CaseDef, TestCase},
    command::{CommandBuffer, CommandEncoder, CommandPool},
    deferred_operation::{finish_deferred_operation, DeferredJoin, DeferredOperation, JoinStatus},
    descriptor::{DescriptorPool, DescriptorSet, DescriptorSetLayout},
    device::{Device, DeviceConfiguration},
    dispatch::{DispatchOrchestrator, CLEAR_VALUE},
    error::CtsError,
    fence::Fence,
    geometry::{GeometryBuilder, Triangle},
    image::{Image, ImageDescriptor, ImageView},
    instance::{Instance, InstanceConfiguration, Version},
    pipeline::{PipelineLayout, RayTracingPipeline, ShaderModule},
    queue::Queue,
    runner::{CaseExecutor, RunnerConfiguration, RunnerState, TestStatus, ThreadingVariantRunner},
    shader_binding_table::{ShaderBindingTable, ShaderBindingTableLayout, StridedRegion},
    shaders::{
        callable_shader_source, compile_all, raygen_shader_source, substitute, GlslangCompiler,
        PipelineShaders, ShaderCompiler, ShaderSource, ShaderStage, DUMMY_WORK_INTERVAL,
        GLSLANG_VALIDATOR_ENV,
    },
    top_level::{TopLevelAccelerationStructure, TopLevelBuilder, TransformMatrix},
    validator::{expected_value, ResultValidator},
    workers::{join_all, worker_count, JoinHandle, WorkerPool, MAX_WORKER_THREADS},
};

#[cfg(feature = "shaderc")]
pub use shaders::ShadercCompiler;

mod acceleration_structure;
mod arena;
mod bottom_level;
mod buffer;
mod capabilities;
mod case;
mod command;
mod context;
mod deferred_operation;
mod descriptor;
mod device;
mod dispatch;
mod error;
mod fence;
mod geometry;
mod image;
mod instance;
mod memory_allocator;
mod pipeline;
mod queue;
mod runner;
mod shader_binding_table;
mod shaders;
mod top_level;
mod validator;
#[cfg(debug_assertions)]
mod vk_debug;
mod workers;

pub(crate) type Result<T> = std::result::Result<T, CtsError>;

/// Groups the allocations of a case by what they back.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Lifetime {
    /// Vertex, instance, read back and shader binding table buffers.
    Buffer,
    /// The output storage image.
    Image,
    /// Acceleration structure storage and scratch buffers.
    AccelerationStructure,
}

impl vk_alloc::Lifetime for Lifetime {}
