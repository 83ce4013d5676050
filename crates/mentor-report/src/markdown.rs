//! Markdown export of a stored course.
//!
//! The document opens with a summary table, then lists every module with its
//! objectives and lessons. Generated lessons are inlined in full; lessons that
//! have only been outlined are marked as such.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::{CourseReport, ModuleSection};

/// Renders a [`CourseReport`] as a Markdown document.
pub struct MarkdownGenerator<'a> {
    report: &'a CourseReport,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a generator for `report`.
    #[must_use]
    pub const fn new(report: &'a CourseReport) -> Self {
        Self { report }
    }

    /// Renders the complete document.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        for (number, module) in (1..).zip(&self.report.modules) {
            write_module(&mut output, number, module);
        }
        write_footer(&mut output, Utc::now());

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# {}\n",
            escape_markdown(&self.report.course_title)
        );
    }

    fn write_summary(&self, output: &mut String) {
        let report = self.report;
        let progress = &report.progress;

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Field | Value |");
        let _ = writeln!(output, "|-------|-------|");
        let _ = writeln!(output, "| Topic | {} |", escape_markdown(&report.topic));
        let _ = writeln!(
            output,
            "| Difficulty | {} |",
            escape_markdown(&report.difficulty_level)
        );
        let _ = writeln!(
            output,
            "| Estimated Duration | {} |",
            format_hours(report.estimated_duration)
        );
        let _ = writeln!(
            output,
            "| Modules Generated | {} of {} ({}%) |",
            progress.completed_modules, progress.total_modules, progress.completion_percentage
        );
        let _ = writeln!(
            output,
            "| Lessons Generated | {} of {} |",
            report.generated_lesson_count(),
            report.lesson_count()
        );
        let _ = writeln!(
            output,
            "| Prerequisites | {} |",
            join_or_none(&report.prerequisites)
        );
        let _ = writeln!(output);
    }
}

fn write_module(output: &mut String, number: usize, module: &ModuleSection) {
    let _ = writeln!(
        output,
        "## Module {number}: {}\n",
        escape_markdown(&module.title)
    );
    let _ = writeln!(output, "{}\n", module.description);

    if !module.depends_on.is_empty() {
        let _ = writeln!(
            output,
            "**Depends on:** {}\n",
            join_or_none(&module.depends_on)
        );
    }

    if !module.learning_objectives.is_empty() {
        let _ = writeln!(output, "**Learning objectives**\n");
        for objective in &module.learning_objectives {
            let _ = writeln!(output, "- {objective}");
        }
        let _ = writeln!(output);
    }

    let _ = writeln!(
        output,
        "**Duration:** {}, {} minutes of lessons\n",
        format_hours(module.estimated_duration),
        module.lesson_minutes()
    );

    if module.lessons.is_empty() {
        let _ = writeln!(output, "*No lessons outlined yet.*\n");
        return;
    }

    for (number, lesson) in (1..).zip(&module.lessons) {
        let _ = writeln!(
            output,
            "### Lesson {number}: {}\n",
            escape_markdown(&lesson.title)
        );
        if lesson.content_markdown.is_empty() {
            let _ = writeln!(output, "*{}, not yet generated*\n", lesson.lesson_type);
            continue;
        }
        let _ = writeln!(
            output,
            "*{}, {} min*\n",
            lesson.lesson_type, lesson.estimated_duration
        );
        let _ = writeln!(output, "{}\n", lesson.content_markdown.trim_end());
    }
}

fn write_footer(output: &mut String, exported_at: DateTime<Utc>) {
    let _ = writeln!(output, "---\n");
    let _ = writeln!(
        output,
        "*Exported by Mentor on {}*",
        exported_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

fn format_hours(hours: u32) -> String {
    if hours == 1 {
        "1 hour".to_string()
    } else {
        format!("{hours} hours")
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "None".to_string()
    } else {
        items
            .iter()
            .map(|s| escape_markdown(s))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Escapes characters that would break headings and table cells.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '|' | '\\' | '<' | '>' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push(' '),
            _ => result.push(ch),
        }
    }

    result
}
