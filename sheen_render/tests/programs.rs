mod common;

use sheen_asset::{StageKind, UniformSlot, UniformValue};
use sheen_render::shaders::{PBR_FRAGMENT, PBR_VERTEX};
use sheen_render::{GpuResources, ProgramManager};

const BROKEN: &str = r#"
@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(undefined_value, 1.0);
}
"#;

#[test]
fn broken_stage_yields_unusable_program() {
    let Some(state) = common::gpu() else { return };
    let resources = GpuResources::new(&state);
    let mut programs = ProgramManager::from_resources(&resources);

    let vs = programs.compile(StageKind::Vertex, "pbr vs", PBR_VERTEX);
    let fs = programs.compile(StageKind::Fragment, "broken fs", BROKEN);
    assert!(programs.stage_status(vs));
    assert!(!programs.stage_status(fs));
    assert!(!programs.stage_info_log(fs).unwrap().is_empty());

    let program = programs.link("broken", vs, fs);
    assert!(!programs.link_status(program));
    assert!(!programs.info_log(program).unwrap().is_empty());

    let slot = programs.resolve(program, "roughness");
    assert_eq!(slot, UniformSlot::ABSENT);
    programs.write(program, slot, 0.5f32);
    programs.flush_uniforms(program);
}

#[test]
fn linked_program_resolves_once_and_stores_writes() {
    let Some(state) = common::gpu() else { return };
    let resources = GpuResources::new(&state);
    let mut programs = ProgramManager::from_resources(&resources);

    let vs = programs.compile(StageKind::Vertex, "pbr vs", PBR_VERTEX);
    let fs = programs.compile(StageKind::Fragment, "pbr fs", PBR_FRAGMENT);
    let program = programs.link("pbr", vs, fs);
    assert!(programs.link_status(program));
    assert!(programs.info_log(program).unwrap().is_empty());

    let roughness = programs.resolve(program, "roughness");
    assert_eq!(roughness, programs.resolve(program, "material.roughness"));
    assert_eq!(roughness, programs.resolve(program, "Material.roughness"));

    programs.write(program, roughness, 0.25f32);
    let table = programs.uniforms(program).unwrap();
    assert_eq!(table.read(roughness), Some(UniformValue::F32(0.25)));

    let missing = programs.resolve(program, "clearcoat");
    assert!(missing.is_absent());
    programs.write(program, missing, 1.0f32);
    programs.flush_uniforms(program);
}

#[test]
fn missing_shader_file_is_a_compile_failure() {
    let Some(state) = common::gpu() else { return };
    let resources = GpuResources::new(&state);
    let mut programs = ProgramManager::from_resources(&resources);

    let fs = programs.compile_file(StageKind::Fragment, "shaders/missing.wgsl");
    assert!(!programs.stage_status(fs));
    assert!(programs.stage_info_log(fs).unwrap().contains("Cannot open file"));
}

#[test]
fn released_programs_leave_no_trace() {
    let Some(state) = common::gpu() else { return };
    let resources = GpuResources::new(&state);
    let mut programs = ProgramManager::from_resources(&resources);

    let vs = programs.compile(StageKind::Vertex, "pbr vs", PBR_VERTEX);
    let fs = programs.compile(StageKind::Fragment, "pbr fs", PBR_FRAGMENT);
    let program = programs.link("pbr", vs, fs);

    assert!(programs.release_shader(vs));
    assert!(programs.release_shader(fs));
    assert!(programs.link_status(program));
    assert!(programs.release_program(program));
    assert!(!programs.release_program(program));

    let counts = programs.counts();
    assert_eq!((counts.shaders, counts.programs), (0, 0));
}
