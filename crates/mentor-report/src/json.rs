//! JSON export of a stored course.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use mentor_orchestrator::MemoryRepository;
//! use mentor_report::{json::JsonGenerator, CourseReport};
//!
//! let repo = MemoryRepository::new();
//! let report = CourseReport::load(&repo, "course-id").unwrap();
//! JsonGenerator::new(&report)
//!     .write_to_file(Path::new("course.json"), true)
//!     .unwrap();
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::{CourseReport, ReportError, Result};

/// Serializes a [`CourseReport`] to JSON.
pub struct JsonGenerator<'a> {
    report: &'a CourseReport,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a generator for `report`.
    #[must_use]
    pub const fn new(report: &'a CourseReport) -> Self {
        Self { report }
    }

    /// Compact single-line JSON.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(self.report).map_err(ReportError::from)
    }

    /// Indented JSON.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self.report).map_err(ReportError::from)
    }

    /// Writes the report to `path`, creating or truncating the file.
    ///
    /// Parent directories must exist.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
