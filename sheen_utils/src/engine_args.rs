use argh::FromArgs;
use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::LazyLock;

fn force_backend(backend: &str) -> Result<Option<Vec<wgpu::Backends>>, String> {
    let backends: wgpu::Backends = wgpu::Backends::from_comma_list(backend);

    if backends.is_empty() {
        return Ok(None);
    }

    let mut backends: Vec<wgpu::Backends> = backends.into_iter().collect();

    // push vulkan back if it's a choice because all other backends are more stable
    backends.sort_by(|a, _| {
        if a.contains(wgpu::Backends::VULKAN) {
            Ordering::Greater
        } else {
            Ordering::Less
        }
    });

    Ok(Some(backends))
}

/// Renderer arguments
#[derive(Default, FromArgs)]
pub struct EngineArgs {
    /// skip building the image based lighting environment
    #[argh(switch, hidden_help)]
    pub no_ibl: bool,
    /// keep the model still instead of rotating it over time
    #[argh(switch, hidden_help)]
    pub no_animation: bool,

    #[argh(option, hidden_help)]
    pub env_face_size: Option<u32>,
    #[argh(option, hidden_help)]
    pub irradiance_size: Option<u32>,
    #[argh(option, hidden_help)]
    pub irradiance_sample_delta: Option<f32>,
    #[argh(option, hidden_help)]
    pub rotation_speed: Option<f32>,

    #[argh(option, hidden_help, from_str_fn(force_backend))]
    pub force_backend: Option<Option<Vec<wgpu::Backends>>>,

    /// equirectangular HDR panorama for image based lighting
    #[argh(option, hidden_help)]
    pub hdr: Option<PathBuf>,
    #[argh(option, hidden_help)]
    pub base_color: Option<PathBuf>,
    #[argh(option, hidden_help)]
    pub normal_map: Option<PathBuf>,
    #[argh(option, hidden_help)]
    pub roughness_map: Option<PathBuf>,
    #[argh(option, hidden_help)]
    pub metallic_map: Option<PathBuf>,
    /// one of quad, cube or triangle
    #[argh(option, hidden_help)]
    pub mesh: Option<String>,

    /// where the rendered frame is written as png
    #[argh(option, hidden_help)]
    pub output: Option<PathBuf>,
    #[argh(option, hidden_help)]
    pub width: Option<u32>,
    #[argh(option, hidden_help)]
    pub height: Option<u32>,
    /// seconds of animation before the frame
    #[argh(option, hidden_help)]
    pub elapsed: Option<f32>,
}

impl EngineArgs {
    fn init() -> Option<EngineArgs> {
        let mut args = std::env::args();
        let cmd_name = args.next()?;
        let args: Vec<String> = args.collect();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        EngineArgs::from_args(&[&cmd_name], &args).ok()
    }

    pub fn get() -> &'static EngineArgs {
        static INSTANCE: LazyLock<EngineArgs> =
            LazyLock::new(|| EngineArgs::init().unwrap_or_default());
        &INSTANCE
    }

    pub fn backends() -> Option<&'static [wgpu::Backends]> {
        EngineArgs::get().force_backend.as_ref()?.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_renderer_switches() {
        let args = EngineArgs::from_args(
            &["sheen"],
            &["--no-ibl", "--env-face-size", "256", "--irradiance-sample-delta", "0.1"],
        )
        .unwrap();

        assert!(args.no_ibl);
        assert!(!args.no_animation);
        assert_eq!(args.env_face_size, Some(256));
        assert_eq!(args.irradiance_sample_delta, Some(0.1));
        assert_eq!(args.irradiance_size, None);
    }

    #[test]
    fn parses_scene_paths() {
        let args = EngineArgs::from_args(
            &["sheen"],
            &["--hdr", "sky.hdr", "--mesh", "cube", "--output", "frame.png", "--width", "320"],
        )
        .unwrap();

        assert_eq!(args.hdr, Some(PathBuf::from("sky.hdr")));
        assert_eq!(args.mesh.as_deref(), Some("cube"));
        assert_eq!(args.output, Some(PathBuf::from("frame.png")));
        assert_eq!(args.width, Some(320));
        assert_eq!(args.base_color, None);
    }

    #[test]
    fn unknown_backend_is_ignored() {
        assert_eq!(force_backend("definitely-not-a-backend"), Ok(None));
    }
}
