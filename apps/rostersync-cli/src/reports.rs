//! Report discovery: the newest CSV in a configured directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::error::{CliError, CliResult};

/// Most recently modified `*.csv` file in `dir`. Payroll exports land in
/// the directory with timestamped names; the newest one is the current
/// report.
pub fn latest_report(dir: &Path) -> CliResult<PathBuf> {
    if !dir.is_dir() {
        return Err(CliError::NoReport(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_csv = path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("csv"));
        if !is_csv {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if newest
            .as_ref()
            .map_or(true, |(newest_time, _)| modified > *newest_time)
        {
            newest = Some((modified, path));
        }
    }

    match newest {
        Some((_, path)) => {
            debug!(path = %path.display(), "picked newest report");
            Ok(path)
        }
        None => Err(CliError::NoReport(format!(
            "no CSV files in {}",
            dir.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    fn touch(path: &Path, age_secs: u64) {
        File::create(path).expect("creates");
        let modified = SystemTime::now() - Duration::from_secs(age_secs);
        File::options()
            .write(true)
            .open(path)
            .expect("opens")
            .set_modified(modified)
            .expect("sets mtime");
    }

    #[test]
    fn picks_the_newest_csv() {
        let dir = tempfile::tempdir().expect("tempdir");
        touch(&dir.path().join("old.csv"), 3600);
        touch(&dir.path().join("new.csv"), 60);
        touch(&dir.path().join("newest.txt"), 0);

        let picked = latest_report(dir.path()).expect("finds one");
        assert_eq!(picked.file_name().unwrap(), "new.csv");
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = latest_report(dir.path());
        assert!(matches!(result, Err(CliError::NoReport(_))));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let result = latest_report(Path::new("/does/not/exist"));
        assert!(matches!(result, Err(CliError::NoReport(_))));
    }
}
