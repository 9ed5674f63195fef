//! Prompt-augmenting tools.
//!
//! Requests name tools by free-form strings; they are converted once, at the
//! boundary, into the closed `ToolKind` set. Unknown names are dropped.

pub mod planner;
pub mod search;

use serde::Deserialize;

pub use planner::{PlanOutcome, SearchMode, SearchPlan, SearchPlanner};
pub use search::{SearchExecutor, SearchProvider, SearchResponse, SearchResult, TavilyClient};

/// System prompt injected when the code interpreter is requested.
pub const CODE_INTERPRETER_PROMPT: &str = "You have access to a Python 3 code interpreter. \
    To solve calculations, data processing, or logic tasks, WRITE PYTHON CODE \
    inside a markdown block like ```python ... ```. \
    The code will be executed and the output shown to the user. \
    Use print() to output results.";

/// System prompt injected when canvas output is requested.
pub const CANVAS_PROMPT: &str = "You can generate standalone content blocks called 'Canvas'. \
    Use <canvas type=\"widget\" title=\"Title\">CONTENT</canvas> for short items (emails, single functions, brief notes). \
    Use <canvas type=\"sidebar\" title=\"Title\">CONTENT</canvas> for long articles, complex code files (e.g. over 15 lines), or full documents. \
    The user can edit these blocks directly. DO NOT wrap the content inside the tags with markdown code blocks unless it is part of the content itself. \
    Choose 'widget' for quick items that don't need a full sidebar, and 'sidebar' for deep work.";

/// A recognised tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    CodeInterpreter,
    Canvas,
    Search,
}

impl ToolKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "code_interpreter" => Some(ToolKind::CodeInterpreter),
            "canvas" => Some(ToolKind::Canvas),
            "search" => Some(ToolKind::Search),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::CodeInterpreter => "code_interpreter",
            ToolKind::Canvas => "canvas",
            ToolKind::Search => "search",
        }
    }
}

/// The set of tools active for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct ToolSet {
    code_interpreter: bool,
    canvas: bool,
    search: bool,
}

impl ToolSet {
    pub fn none() -> Self {
        Self::default()
    }

    /// Build from free-form names, ignoring anything unrecognised.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter_map(|name| {
                let kind = ToolKind::parse(name.as_ref());
                if kind.is_none() {
                    tracing::debug!(tool = name.as_ref(), "Ignoring unknown tool");
                }
                kind
            })
            .fold(Self::none(), Self::with)
    }

    pub fn with(mut self, kind: ToolKind) -> Self {
        match kind {
            ToolKind::CodeInterpreter => self.code_interpreter = true,
            ToolKind::Canvas => self.canvas = true,
            ToolKind::Search => self.search = true,
        }
        self
    }

    pub fn contains(&self, kind: ToolKind) -> bool {
        match kind {
            ToolKind::CodeInterpreter => self.code_interpreter,
            ToolKind::Canvas => self.canvas,
            ToolKind::Search => self.search,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.code_interpreter || self.canvas || self.search)
    }
}

impl From<Vec<String>> for ToolSet {
    fn from(names: Vec<String>) -> Self {
        Self::from_names(names)
    }
}
