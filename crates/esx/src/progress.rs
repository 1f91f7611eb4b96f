//! 📊 Throughput while a job runs: a bar, and a small table of rates under it.
//!
//! Rates come from a five second sliding window so one slow bulk response does not make the
//! numbers lurch. When the total size is unknown (a gzipped input, a scroll) the bar still
//! counts but the percent and remaining-time cells show `--`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

const MIB: f64 = 1024.0 * 1024.0;
const RATE_WINDOW: Duration = Duration::from_secs(5);

/// 🔢 `1234567` → `1,234,567`
pub(crate) fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// ⏱️ `MM:SS`, or `HH:MM:SS` once it has been a while.
pub(crate) fn format_elapsed(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Rates {
    docs_per_sec: f64,
    mib_per_sec: f64,
}

pub(crate) struct ProgressMetrics {
    label: String,
    total_size: u64,
    bytes: u64,
    docs: u64,
    bar: ProgressBar,
    samples: VecDeque<(Instant, u64, u64)>,
    started: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressMetrics")
            .field("label", &self.label)
            .field("total_size", &self.total_size)
            .field("bytes", &self.bytes)
            .field("docs", &self.docs)
            .finish()
    }
}

impl ProgressMetrics {
    /// `total_size` of 0 means "unknown".
    pub(crate) fn new(label: String, total_size: u64) -> Self {
        let bar = ProgressBar::new(total_size);
        // -- 🎨 a bad template only costs us the styling, never the job
        if let Ok(style) = ProgressStyle::default_bar().template("{msg}\n| [{bar:40.cyan/blue}]") {
            bar.set_style(style.progress_chars("=>-"));
        }
        let started = Instant::now();
        Self {
            label,
            total_size,
            bytes: 0,
            docs: 0,
            bar,
            samples: VecDeque::from([(started, 0, 0)]),
            started,
        }
    }

    pub(crate) fn update(&mut self, bytes: u64, docs: u64) {
        self.bytes += bytes;
        self.docs += docs;
        let rates = self.rates(Instant::now());
        self.bar.set_message(self.render(rates));
        self.bar.set_position(self.bytes);
    }

    pub(crate) fn finish(&self) {
        self.bar.finish();
    }

    fn rates(&mut self, now: Instant) -> Rates {
        while self
            .samples
            .front()
            .is_some_and(|(at, _, _)| now.duration_since(*at) > RATE_WINDOW)
        {
            self.samples.pop_front();
        }
        self.samples.push_back((now, self.bytes, self.docs));

        let Some(&(oldest, oldest_bytes, oldest_docs)) = self.samples.front() else {
            return Rates::default();
        };
        let elapsed = now.duration_since(oldest).as_secs_f64();
        if elapsed <= 0.0 {
            return Rates::default();
        }
        Rates {
            docs_per_sec: self.docs.saturating_sub(oldest_docs) as f64 / elapsed,
            mib_per_sec: self.bytes.saturating_sub(oldest_bytes) as f64 / elapsed / MIB,
        }
    }

    fn percent(&self) -> Option<f64> {
        (self.total_size > 0).then(|| self.bytes as f64 / self.total_size as f64 * 100.0)
    }

    fn remaining(&self) -> String {
        let elapsed = self.started.elapsed().as_secs_f64();
        match self.percent() {
            Some(percent) if percent > 0.0 && percent < 100.0 => {
                let left = elapsed / (percent / 100.0) - elapsed;
                format_elapsed(Duration::from_secs_f64(left.max(0.0)))
            }
            _ => "--:--".to_string(),
        }
    }

    fn render(&self, rates: Rates) -> String {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        let right = |text: String| Cell::new(text).set_alignment(CellAlignment::Right);

        table.add_row(vec![
            right(format!("{} docs/s", format_count(rates.docs_per_sec as u64))),
            right(format!("{} docs", format_count(self.docs))),
        ]);
        table.add_row(vec![
            right(format!("{:.2} MiB/s", rates.mib_per_sec)),
            right(format!("{:.2} MiB", self.bytes as f64 / MIB)),
        ]);
        table.add_row(vec![
            right(format!("{} elapsed", format_elapsed(self.started.elapsed()))),
            right(format!("{} remaining", self.remaining())),
        ]);
        match self.percent() {
            Some(percent) => format!("{} ({percent:.2}%)\n{table}", self.label),
            None => format!("{}\n{table}", self.label),
        }
    }
}
