use chrono::{DateTime, Local};

/// Settings shared by every stage of a compilation.
///
/// Built with chained setters:
///
/// ```
/// use tplc::options::CompileOptions;
///
/// let options = CompileOptions::new().trim_command_lines(false);
/// assert!(!options.trims_command_lines());
/// ```
#[derive(Debug, Clone)]
pub struct CompileOptions {
    trim_command_lines: bool,
    compile_time: Option<DateTime<Local>>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self {
            trim_command_lines: true,
            compile_time: None,
        }
    }

    /// Drop the newline of lines that hold nothing but a command tag.
    pub fn trim_command_lines(mut self, trim: bool) -> Self {
        self.trim_command_lines = trim;
        self
    }

    /// Pin the timestamp baked in by `__compile_time__` and friends.
    pub fn compile_time(mut self, time: DateTime<Local>) -> Self {
        self.compile_time = Some(time);
        self
    }

    pub fn trims_command_lines(&self) -> bool {
        self.trim_command_lines
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.compile_time.unwrap_or_else(Local::now)
    }
}
