use crate::job::{Job, Progress};

const BAR_CELLS: usize = 20;
const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

/// Render the action-bar text for a set of jobs. Unlabelled jobs are not
/// shown; `None` when nothing is left to show.
pub(crate) fn render<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Option<String> {
    let shown: Vec<&Job> = jobs.into_iter().filter(|job| !job.label().is_empty()).collect();
    if shown.is_empty() {
        return None;
    }
    let numbered = shown.len() > 1;
    let lines: Vec<String> = shown
        .iter()
        .enumerate()
        .map(|(i, job)| {
            let prefix = if numbered {
                format!("Job {}: ", i + 1)
            } else {
                String::new()
            };
            format!("{prefix}{}\n{}", job.label(), progress_line(job))
        })
        .collect();
    Some(lines.join("\n"))
}

fn progress_line(job: &Job) -> String {
    match job.progress() {
        Progress::Fraction(fraction) => format!("{} {:.2}%", bar(fraction), fraction * 100.0),
        Progress::Indeterminate => {
            let frame = SPINNER[(job.ticks_alive % SPINNER.len() as u64) as usize];
            format!("{} {frame}", "▒".repeat(BAR_CELLS))
        }
    }
}

/// Cell `i` is filled once `i / 20 <= fraction`.
fn bar(fraction: f32) -> String {
    (0..BAR_CELLS)
        .map(|i| {
            if i as f32 / BAR_CELLS as f32 <= fraction {
                '█'
            } else {
                '▒'
            }
        })
        .collect()
}
