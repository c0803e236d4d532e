use sheen::{
    EngineArgs, EnvironmentSettings, FrameSettings, Mesh, Renderer, RendererError, TextureRole,
};
use tracing::{error, info, warn};

fn main() {
    sheen::logging::init();

    if let Err(e) = run() {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), RendererError> {
    let args = EngineArgs::get();

    let mesh = match args.mesh.as_deref() {
        None | Some("quad") => Mesh::unit_quad(),
        Some("cube") => Mesh::unit_cube(),
        Some("triangle") => Mesh::triangle(),
        Some(other) => {
            warn!("Unknown mesh {other:?}, drawing a quad");
            Mesh::unit_quad()
        }
    };

    let width = args.width.unwrap_or(800);
    let height = args.height.unwrap_or(600);
    let mut renderer = Renderer::headless(width, height, &mesh, FrameSettings::from_args())?;

    let maps = [
        (TextureRole::BaseColor, &args.base_color),
        (TextureRole::Normal, &args.normal_map),
        (TextureRole::Roughness, &args.roughness_map),
        (TextureRole::Metallic, &args.metallic_map),
    ];
    for (role, path) in maps {
        let Some(path) = path else {
            continue;
        };
        renderer.load_texture(role, path);
    }

    renderer.material.use_base_texture = args.base_color.is_some();
    renderer.material.use_normal_map = args.normal_map.is_some();
    renderer.material.use_roughness_map = args.roughness_map.is_some();
    renderer.material.use_metallic_map = args.metallic_map.is_some();

    match &args.hdr {
        Some(path) if !args.no_ibl => {
            if let Err(e) = renderer.load_environment(path, &EnvironmentSettings::from_args()) {
                warn!("{e}. Rendering without image based lighting");
                renderer.material.use_ibl = false;
            }
        }
        _ => renderer.material.use_ibl = false,
    }

    let report = renderer.render_frame(args.elapsed.unwrap_or(0.0));
    info!("Rendered {width}x{height} frame: {report:?}");

    let output = args.output.clone().unwrap_or_else(|| "frame.png".into());
    renderer.save_png(&output)?;
    info!("Wrote {}", output.display());

    renderer.shutdown();
    Ok(())
}
