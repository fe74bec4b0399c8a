#![forbid(unsafe_code)]

//! Directory-change handoff to the wrapping shell function.
//!
//! With `GWT_USE_FD3=1` the `cd <path>` line goes to file descriptor 3,
//! which the wrapper captures and `eval`s; everything the user should see
//! stays on the normal streams.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use crate::error::GwtError;

pub const FD3_ENV: &str = "GWT_USE_FD3";
const FD3_PATH: &str = "/dev/fd/3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
}

#[must_use]
pub fn fd3_enabled() -> bool {
    std::env::var(FD3_ENV).is_ok_and(|v| v == "1")
}

/// Quotes `s` for POSIX shells unless every character is inert.
#[must_use]
pub fn shell_quote(s: &str) -> String {
    let inert = |c: char| c.is_ascii_alphanumeric() || "/._-+,:@%=".contains(c);
    if !s.is_empty() && s.chars().all(inert) {
        return s.to_owned();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[must_use]
pub fn cd_line(path: &Path) -> String {
    format!("cd {}\n", shell_quote(&path.to_string_lossy()))
}

pub fn write_cd(out: &mut impl Write, path: &Path) -> io::Result<()> {
    out.write_all(cd_line(path).as_bytes())?;
    out.flush()
}

/// Sends `cd <abs-path>` through fd 3 when enabled, stdout otherwise.
pub fn emit_cd(path: &Path) -> Result<(), GwtError> {
    let path = std::path::absolute(path).map_err(|e| GwtError::IoPath {
        path: path.to_path_buf(),
        source: e,
    })?;
    let fd3_err = |e| GwtError::IoPath {
        path: FD3_PATH.into(),
        source: e,
    };

    if fd3_enabled() {
        log::debug!("emitting cd via fd 3: {}", path.display());
        let mut fd3 = OpenOptions::new()
            .append(true)
            .open(FD3_PATH)
            .map_err(fd3_err)?;
        write_cd(&mut fd3, &path).map_err(fd3_err)
    } else {
        write_cd(&mut io::stdout().lock(), &path)
            .map_err(|e| GwtError::Other(format!("failed to write to stdout: {e}")))
    }
}

/// Wrapper function that routes the binary's fd 3 into `eval` and leaves
/// stdout on the terminal.
#[must_use]
pub fn init_script(shell: Shell, function_name: &str, binary: &str) -> String {
    match shell {
        Shell::Bash | Shell::Zsh => format!(
            r#"{function_name}() {{
    local __gwt_cd
    __gwt_cd="$({FD3_ENV}=1 command {binary} "$@" 3>&1 1>&2)" || return $?
    if [ -n "$__gwt_cd" ]; then
        eval "$__gwt_cd"
    fi
}}
"#
        ),
        Shell::Fish => format!(
            r#"function {function_name}
    set -l __gwt_cd (env {FD3_ENV}=1 {binary} $argv 3>&1 1>&2)
    set -l __gwt_status $status
    if test $__gwt_status -ne 0
        return $__gwt_status
    end
    if test -n "$__gwt_cd"
        eval $__gwt_cd
    end
end
"#
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_paths_stay_unquoted() {
        assert_eq!(cd_line(Path::new("/home/me/repo-feature")), "cd /home/me/repo-feature\n");
    }

    #[test]
    fn metacharacters_are_single_quoted() {
        assert_eq!(shell_quote("/tmp/a b"), "'/tmp/a b'");
        assert_eq!(shell_quote("/tmp/it's"), r"'/tmp/it'\''s'");
        assert_eq!(shell_quote("/tmp/$(rm)"), "'/tmp/$(rm)'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn write_cd_emits_single_line() {
        let mut out = Vec::new();
        write_cd(&mut out, Path::new("/srv/wt")).unwrap();
        assert_eq!(out, b"cd /srv/wt\n");
    }

    #[test]
    fn init_scripts_route_fd3() {
        for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
            let script = init_script(shell, "gwt", "git-wt");
            assert!(script.contains("GWT_USE_FD3=1"));
            assert!(script.contains("3>&1 1>&2"));
            assert!(script.contains("eval"));
        }
    }
}
