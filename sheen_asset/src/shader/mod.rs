//! Shader stage compilation and program linking on the CPU.
//!
//! Stages are WGSL sources with a single entry point. Compiling parses and
//! validates the source with naga and never fails outright: a broken stage is
//! still returned, flagged as unusable and carrying the rendered diagnostic.
//! Linking checks two usable stages against each other and produces the
//! [`ProgramLayout`] the GPU side builds its bind groups and pipelines from.

mod link;
mod reflect;

pub use link::{LinkError, ProgramBinding, ProgramLayout, link_stages};
pub use reflect::{
    BindingKind, InterfaceVar, IoType, ResourceBinding, StageReflection, UniformBlockLayout,
    UniformKind, UniformMember,
};

use naga::ShaderStage;
use naga::valid::{Capabilities, ValidationFlags, Validator};
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;
use tracing::{debug, error};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StageKind {
    Vertex,
    Fragment,
}

impl StageKind {
    const fn naga(self) -> ShaderStage {
        match self {
            StageKind::Vertex => ShaderStage::Vertex,
            StageKind::Fragment => ShaderStage::Fragment,
        }
    }
}

impl Display for StageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Vertex => write!(f, "vertex"),
            StageKind::Fragment => write!(f, "fragment"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledStage {
    label: String,
    kind: StageKind,
    source: String,
    reflection: Option<StageReflection>,
    info_log: String,
}

impl CompiledStage {
    #[profiling::function]
    pub fn compile(label: impl Into<String>, kind: StageKind, source: impl Into<String>) -> Self {
        let label = label.into();
        let source = source.into();

        match Self::check(kind, &source) {
            Ok(reflection) => {
                debug!("Compiled {kind} shader {label:?}");
                CompiledStage {
                    label,
                    kind,
                    source,
                    reflection: Some(reflection),
                    info_log: String::new(),
                }
            }
            Err(info_log) => Self::failed(label, kind, source, info_log),
        }
    }

    /// Reads the whole file as the stage source. An unreadable file yields an unusable stage.
    pub fn compile_file(kind: StageKind, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let label = path.display().to_string();

        match fs::read_to_string(path) {
            Ok(source) => Self::compile(label, kind, source),
            Err(e) => {
                let info_log = format!("Cannot open file {label}: {e}");
                Self::failed(label, kind, String::new(), info_log)
            }
        }
    }

    fn failed(label: String, kind: StageKind, source: String, info_log: String) -> Self {
        if info_log.is_empty() {
            error!("Failed to compile {kind} shader {label:?}. No info log");
        } else {
            error!("Failed to compile {kind} shader {label:?}. Info log:\n{info_log}");
        }

        CompiledStage {
            label,
            kind,
            source,
            reflection: None,
            info_log,
        }
    }

    fn check(kind: StageKind, source: &str) -> Result<StageReflection, String> {
        let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;

        let info = Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .map_err(|e| e.emit_to_string(source))?;

        let mut entries = module
            .entry_points
            .iter()
            .enumerate()
            .filter(|(_, ep)| ep.stage == kind.naga());

        let Some((index, entry)) = entries.next() else {
            return Err(format!("no @{kind} entry point found"));
        };
        if let Some((_, extra)) = entries.next() {
            return Err(format!(
                "more than one @{kind} entry point found: `{}` and `{}`",
                entry.name, extra.name
            ));
        }

        reflect::reflect_entry_point(&module, &info, index, entry)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_usable(&self) -> bool {
        self.reflection.is_some()
    }

    /// Compiler diagnostic text; empty for a stage that compiled cleanly.
    pub fn info_log(&self) -> &str {
        &self.info_log
    }

    pub fn reflection(&self) -> Option<&StageReflection> {
        self.reflection.as_ref()
    }
}
