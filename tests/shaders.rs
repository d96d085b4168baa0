use std::collections::HashSet;
use std::sync::Mutex;

use vkcts_rt::{
    callable_shader_source, compile_all, raygen_shader_source, substitute, CtsError,
    GlslangCompiler, PipelineShaders, ShaderCompiler, ShaderSource, ShaderStage,
    DUMMY_WORK_INTERVAL,
};

mod fixture;

#[test]
fn placeholders_are_substituted() {
    let text = substitute("${A} and ${B}, ${A}", &[("A", "x"), ("B", "y")]);
    assert_eq!(text, "x and y, x");

    let text = substitute("${UNKNOWN} ${A", &[("A", "x")]);
    assert_eq!(text, "${UNKNOWN} ${A");
}

#[test]
fn raygen_source() {
    let source = raygen_shader_source();

    assert_eq!(source.stage, ShaderStage::RayGeneration);
    assert!(source.text.starts_with("#version 460"));
    assert!(source.text.contains("#extension GL_EXT_ray_tracing : require"));
    assert!(source.text.contains("executeCallableEXT(callableIndex, 0)"));
    assert!(!source.text.contains("${"));
}

#[test]
fn callable_computes_its_value_from_its_index() {
    // Pixel (3, 7) of an 8 pixel wide image.
    let source = callable_shader_source(8, 59);

    assert_eq!(source.stage, ShaderStage::Callable);
    assert_eq!(source.name, "callable_59");
    assert!(source.text.contains("const uint callableIndex = 59u;"));
    assert!(source.text.contains("const uint width = 8u;"));
    assert!(source
        .text
        .contains("uint value = (width * (y / 3u) + x) % 199u;"));
    assert!(!source.text.contains("19u"));
    assert!(!source.text.contains("${"));
}

#[test]
fn every_callable_of_a_large_pipeline_is_distinct() {
    let shaders = PipelineShaders::new(64, 64);

    assert_eq!(shaders.callable_count(), 4096);
    assert_eq!(shaders.sources.len(), 4097);
    assert_eq!(shaders.group_stages.len(), 4097);
    assert_eq!(shaders.sources[0].stage, ShaderStage::RayGeneration);

    for (group, &stage) in shaders.group_stages.iter().enumerate() {
        assert_eq!(stage as usize, group);
    }

    for (index, source) in shaders.sources[1..].iter().enumerate() {
        assert_eq!(source.stage, ShaderStage::Callable);
        assert_eq!(source.name, format!("callable_{}", index));
        assert!(source
            .text
            .contains(&format!("const uint callableIndex = {}u;", index)));
        assert_eq!(
            source.text.contains("dummy"),
            index as u32 % DUMMY_WORK_INTERVAL == 0,
            "callable {}",
            index
        );
    }

    let unique: HashSet<&str> = shaders.sources.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(unique.len(), 4097);
}

#[test]
fn small_pipeline_has_one_callable_per_pixel() {
    let shaders = PipelineShaders::new(8, 8);

    assert_eq!(shaders.callable_count(), 64);
    assert_eq!(shaders.group_stages, (0..=64).collect::<Vec<u32>>());

    let unique: HashSet<&str> = shaders.sources.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(unique.len(), 65);
}

#[test]
fn dummy_work_on_multiples_of_the_interval() {
    assert_eq!(DUMMY_WORK_INTERVAL, 43);
    for index in 0..200 {
        let source = callable_shader_source(64, index);
        assert_eq!(
            source.text.contains("dummy"),
            index % DUMMY_WORK_INTERVAL == 0,
            "callable {}",
            index
        );
    }
}

/// Returns the index of the source as code and remembers the order of the calls.
struct MockCompiler {
    compiled: Mutex<Vec<String>>,
}

impl ShaderCompiler for MockCompiler {
    fn compile(&self, source: &ShaderSource) -> Result<Vec<u32>, CtsError> {
        self.compiled.lock().unwrap().push(source.name.clone());
        if source.text.contains("broken") {
            return Err(CtsError::ShaderCompilation {
                name: source.name.clone(),
                log: "syntax error".to_owned(),
            });
        }
        let index = source.name.trim_start_matches("callable_").parse().unwrap();
        Ok(vec![0x0723_0203, index])
    }
}

#[test]
fn parallel_compilation_keeps_the_order() {
    let compiler = MockCompiler {
        compiled: Mutex::new(Vec::new()),
    };
    let sources: Vec<ShaderSource> = (0..512).map(|i| callable_shader_source(64, i)).collect();

    let codes = compile_all(&compiler, &sources).unwrap();

    assert_eq!(codes.len(), 512);
    for (index, code) in codes.iter().enumerate() {
        assert_eq!(code[1], index as u32);
    }
    assert_eq!(compiler.compiled.lock().unwrap().len(), 512);
}

#[test]
fn compilation_errors_are_reported() {
    let compiler = MockCompiler {
        compiled: Mutex::new(Vec::new()),
    };
    let mut sources: Vec<ShaderSource> = (0..8).map(|i| callable_shader_source(8, i)).collect();
    sources[5].text.push_str("broken");

    let result = compile_all(&compiler, &sources);

    assert!(matches!(
        result,
        Err(CtsError::ShaderCompilation { ref name, .. }) if name == "callable_5"
    ));
}

#[test]
fn missing_glslang_binary_is_not_supported() {
    let compiler = GlslangCompiler::with_executable("/nonexistent/glslangValidator");

    assert!(!compiler.is_available());
    let result = compiler.compile(&callable_shader_source(8, 0));
    assert!(matches!(result, Err(CtsError::NotSupported(_))));
}

#[test]
fn glslang_compiles_the_templates() {
    let compiler = match fixture::try_compiler("glslang_compiles_the_templates") {
        Some(compiler) => compiler,
        None => return,
    };

    let sources = vec![
        raygen_shader_source(),
        callable_shader_source(64, 0),
        callable_shader_source(64, 1),
    ];
    let codes = compile_all(&compiler, &sources).unwrap();

    for code in codes {
        assert_eq!(code[0], 0x0723_0203);
    }
}
