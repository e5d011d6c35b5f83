use std::io::IsTerminal;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use nu_ansi_term::{Color, Style};

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum Theme {
    Auto,
    Light,
    Dark,
    Plain,
}

/// Kind of one-line status message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Status {
    Done,
    Note,
    Problem,
}

impl Status {
    fn icon(self) -> &'static str {
        match self {
            Status::Done => "✔",
            Status::Note => "ℹ",
            Status::Problem => "⚠",
        }
    }
}

/// Terminal output for the CLI. Result rows always go to stdout; status
/// lines and spinners stay off it when output is machine-readable.
pub struct Ui {
    colors: Option<Colors>,
    quiet: bool,
}

impl Ui {
    /// `quiet` suppresses decoration, for machine-readable output.
    pub fn new(theme: Theme, quiet: bool) -> Self {
        let colors = (theme != Theme::Plain && !quiet && std::io::stdout().is_terminal())
            .then(|| Colors::for_theme(theme));

        #[cfg(windows)]
        if colors.is_some() {
            let _ = nu_ansi_term::enable_ansi_support();
        }

        Self { colors, quiet }
    }

    fn paint(&self, pick: impl FnOnce(&Colors) -> Style, text: &str) -> String {
        match &self.colors {
            Some(colors) => pick(colors).paint(text).to_string(),
            None => text.to_owned(),
        }
    }

    /// Prints one result set as aligned columns.
    pub fn table(&self, columns: &[String], rows: &[Vec<String>]) {
        if columns.is_empty() {
            return;
        }
        let widths = column_widths(columns, rows);
        println!("{}", self.paint(|c| c.heading, &pad_row(columns, &widths)));
        for row in rows {
            println!("{}", self.paint(|c| c.cell, &pad_row(row, &widths)));
        }
    }

    fn status(&self, status: Status, message: &str) {
        let icon = self.paint(|c| c.status(status), status.icon());
        match status {
            Status::Problem => eprintln!("{icon} {message}"),
            _ if self.quiet => {}
            _ => println!("{icon} {message}"),
        }
    }

    pub fn success(&self, message: &str) {
        self.status(Status::Done, message);
    }

    pub fn info(&self, message: &str) {
        self.status(Status::Note, message);
    }

    pub fn warn(&self, message: &str) {
        self.status(Status::Problem, message);
    }

    /// Spinner on stderr until the guard is finished or dropped.
    pub fn task(&self, label: impl Into<String>) -> TaskGuard<'_> {
        let label = label.into();
        let spinner = (!self.quiet && std::io::stderr().is_terminal()).then(|| {
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            let spinner = ProgressBar::new_spinner().with_style(style);
            spinner.set_message(label.clone());
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner
        });
        TaskGuard {
            ui: self,
            label,
            started: Instant::now(),
            spinner,
        }
    }
}

fn column_widths(columns: &[String], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    widths
}

fn pad_row(cells: &[String], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

/// A running step. Dropping it without [`TaskGuard::finish`] reports a failure.
pub struct TaskGuard<'a> {
    ui: &'a Ui,
    label: String,
    started: Instant,
    spinner: Option<ProgressBar>,
}

impl TaskGuard<'_> {
    pub fn finish(mut self) -> Duration {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
        let elapsed = self.started.elapsed();
        // Disarm the failure report in Drop.
        self.label.clear();
        elapsed
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        if self.label.is_empty() {
            return;
        }
        let message = format!(
            "{} failed after {}",
            self.label,
            format_duration(self.started.elapsed())
        );
        match self.spinner.take() {
            Some(spinner) => spinner.abandon_with_message(message),
            None => self.ui.warn(&message),
        }
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 1.0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{secs:.2}s")
    }
}

struct Colors {
    heading: Style,
    cell: Style,
    done: Style,
    note: Style,
    problem: Style,
}

impl Colors {
    fn for_theme(theme: Theme) -> Self {
        let light = theme == Theme::Light;
        let pick = |on_light: Color, on_dark: Color| if light { on_light } else { on_dark };
        Self {
            heading: Style::new().bold().underline(),
            cell: Style::default(),
            done: Style::new().fg(pick(Color::Green, Color::LightGreen)),
            note: Style::new().fg(pick(Color::Blue, Color::LightCyan)),
            problem: Style::new().fg(pick(Color::Red, Color::Yellow)).bold(),
        }
    }

    fn status(&self, status: Status) -> Style {
        match status {
            Status::Done => self.done,
            Status::Note => self.note,
            Status::Problem => self.problem,
        }
    }
}
