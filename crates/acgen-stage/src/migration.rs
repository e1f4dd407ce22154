//! Numbered migration files.

use std::path::{Path, PathBuf};

use acgen_core::{FileAccess, FileAccessError};

const MIGRATION_SUFFIX: &str = "_migrate.up.sql";

/// Number the next migration in `dir` gets: one past the largest existing `*.sql` prefix.
pub fn next_migration_number<F: FileAccess + ?Sized>(
    files: &F,
    dir: &Path,
) -> Result<u64, FileAccessError> {
    let names = match files.list_files(dir) {
        Ok(names) => names,
        Err(e) if e.is_not_found() => Vec::new(),
        Err(e) => return Err(e),
    };

    let largest = names
        .iter()
        .filter(|name| name.ends_with(".sql"))
        .filter_map(|name| {
            let digits: String = name.chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<u64>().ok()
        })
        .max()
        .unwrap_or(0);
    Ok(largest + 1)
}

pub fn migration_file_name(number: u64) -> String {
    format!("{number:04}{MIGRATION_SUFFIX}")
}

/// Write `sql` as the next migration in `dir`.
pub fn write_migration<F: FileAccess + ?Sized>(
    files: &F,
    dir: &Path,
    sql: &str,
) -> Result<PathBuf, FileAccessError> {
    let number = next_migration_number(files, dir)?;
    let path = dir.join(migration_file_name(number));
    files.write_file(&path, sql.as_bytes())?;
    tracing::info!(path = %path.display(), "wrote migration");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use acgen_core::MemoryFiles;

    #[test]
    fn test_first_migration() {
        let files = MemoryFiles::new();
        let path = write_migration(&files, Path::new("migrations/bob"), "select 1;").unwrap();
        assert_eq!(path, PathBuf::from("migrations/bob/0001_migrate.up.sql"));
    }

    #[test]
    fn test_numbering_follows_largest_sql_file() {
        let files = MemoryFiles::new()
            .with_file("migrations/bob/0007_migrate.up.sql", "")
            .with_file("migrations/bob/1003_migrate.up.sql", "")
            .with_file("migrations/bob/9999_notes.txt", "")
            .with_file("migrations/bob/README.sql", "");
        assert_eq!(
            next_migration_number(&files, Path::new("migrations/bob")).unwrap(),
            1004
        );
        assert_eq!(migration_file_name(12345), "12345_migrate.up.sql");
    }
}
