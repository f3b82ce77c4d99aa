//! Helpers for rule actions: running shell commands and touching the filesystem.

use std::{fs, io, path::Path, process::Output};

use console::Term;
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("{0}")]
    SpawnFailed(#[from] io::Error),
    #[error("`{cmdline}` failed with {}", .output.status)]
    CommandFailed { cmdline: String, output: Output },
}

pub type CommandResult<T> = Result<T, CommandError>;

/// Joins the arguments with single spaces.
pub fn make_string<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join(" ")
}

/// Prints the joined arguments on stdout and returns them.
pub fn echo<S: AsRef<str>>(args: &[S]) -> io::Result<String> {
    let line = make_string(args);
    Term::stdout().write_line(&line)?;
    Ok(line)
}

async fn run_command(cmdline: &str) -> CommandResult<Output> {
    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmdline)
        .output()
        .await?;
    if !output.status.success() {
        return Err(CommandError::CommandFailed {
            cmdline: cmdline.to_owned(),
            output,
        });
    }
    Ok(output)
}

/// Runs `cmdline` through `/bin/sh` and returns its stdout lines. A non-zero exit is an error.
pub fn exec(cmdline: &str) -> CommandResult<Vec<String>> {
    tracing::info!(%cmdline, "execute shell command");
    // One runtime per command; the engine itself is synchronous.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(run_command(cmdline))?;
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_owned)
        .collect())
}

pub fn shell<S: AsRef<str>>(args: &[S]) -> CommandResult<Vec<String>> {
    exec(&make_string(args))
}

/// Full path of an executable on `PATH`.
pub fn which(name: &str) -> CommandResult<String> {
    Ok(exec(&format!("which {}", name))?.concat())
}

/// Creates each file, truncating it if it exists.
pub fn touch<P: AsRef<Path>>(paths: &[P]) -> io::Result<()> {
    for path in paths {
        fs::File::create(path)?;
    }
    Ok(())
}

pub fn mkdirs<P: AsRef<Path>>(paths: &[P]) -> io::Result<()> {
    for path in paths {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Removes files and whole directory trees. Paths that do not exist are skipped.
pub fn rm<P: AsRef<Path>>(paths: &[P]) -> io::Result<()> {
    for path in paths {
        let path = path.as_ref();
        let result = match fs::symlink_metadata(path) {
            Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(e) => Err(e),
        };
        match result {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_arguments() {
        assert_eq!(make_string(&["g++", "-c", "-o", "a.o"]), "g++ -c -o a.o");
        assert_eq!(make_string::<&str>(&[]), "");
    }

    #[test]
    fn exec_collects_lines() {
        let lines = exec("echo one; echo two").expect("runs");
        assert_eq!(lines, vec!["one", "two"]);
        assert_eq!(shell(&["printf", "'%s'", "x"]).expect("runs"), vec!["x"]);
    }

    #[test]
    fn exec_fails_on_exit_status() {
        let err = exec("exit 3").expect_err("non-zero");
        match err {
            CommandError::CommandFailed {
                ref cmdline,
                ref output,
            } => {
                assert_eq!(cmdline, "exit 3");
                assert_eq!(output.status.code(), Some(3));
            }
            ref other => panic!("unexpected {:?}", other),
        }
        assert!(err.to_string().starts_with("`exit 3` failed with"));
    }

    #[test]
    fn which_finds_the_shell() {
        let sh = which("sh").expect("sh is on PATH");
        assert!(sh.ends_with("/sh"));
    }

    #[test]
    fn filesystem_helpers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("objects/deep");
        let file = nested.join("a.o");

        mkdirs(&[&nested]).expect("mkdirs");
        assert!(nested.is_dir());
        touch(&[&file]).expect("touch");
        assert!(file.is_file());

        rm(&[dir.path().join("objects"), dir.path().join("missing")]).expect("rm");
        assert!(!dir.path().join("objects").exists());
    }
}
