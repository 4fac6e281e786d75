//! First-run setup of the user file

use std::io::{BufRead, Write};
use std::path::Path;

use crate::users::{StoreError, UserStore};

/// Open the user file, or create it interactively when it does not exist.
///
/// A file that exists but cannot be parsed is an error, never a reset.
pub fn open_or_bootstrap<R, W>(path: &Path, mut input: R, mut output: W) -> Result<UserStore, StoreError>
where
    R: BufRead,
    W: Write,
{
    if path.exists() {
        return UserStore::open(path);
    }

    tracing::info!("No user file at {}, creating one", path.display());

    let username = prompt(&mut input, &mut output, "No user file provided. What will your username be?")?;
    let password = prompt(&mut input, &mut output, "What will your password be?")?;

    if username.is_empty() || password.is_empty() {
        tracing::error!("Bad input for new username/password and no user file existing");
        return Err(StoreError::EmptyCredentials);
    }

    UserStore::create(path, &username, &password)
}

fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> Result<String, StoreError> {
    writeln!(output, "{}", question)?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}
