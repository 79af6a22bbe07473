//
// Copyright 2026 The Project Oak Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Named access-key profiles in an INI-style credentials file.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::Context;
use fitbench::BenchError;

const ACCESS_KEY_ID: &str = "aws_access_key_id";
const SECRET_ACCESS_KEY: &str = "aws_secret_access_key";

/// `~/.aws/credentials`.
pub fn default_credentials_path() -> Result<PathBuf, BenchError> {
    let home = dirs::home_dir().ok_or(BenchError::HomeDirectoryNotFound)?;
    Ok(home.join(".aws").join("credentials"))
}

/// Creates or updates `profile` in the credentials file at `path` with the
/// given key pair.
///
/// The file and its parent directories are created when missing. Other
/// profiles, and other keys of the same profile, are kept as they are.
pub fn upsert_profile(
    path: &Path,
    profile: &str,
    access_key_id: &str,
    secret_access_key: &str,
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("couldn't create {}", parent.display()))?;
    }
    let existing = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == io::ErrorKind::NotFound => String::new(),
        Err(error) => {
            return Err(error).with_context(|| format!("couldn't read {}", path.display()))
        }
    };

    let updated = upsert_section(
        &existing,
        profile,
        &[(ACCESS_KEY_ID, access_key_id), (SECRET_ACCESS_KEY, secret_access_key)],
    );
    fs::write(path, updated).with_context(|| format!("couldn't write {}", path.display()))?;
    log::info!("profile '{}' added to {}", profile, path.display());
    Ok(())
}

fn upsert_section(contents: &str, section: &str, entries: &[(&str, &str)]) -> String {
    let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();
    let header = format!("[{section}]");

    match lines.iter().position(|line| line.trim() == header) {
        None => {
            if lines.last().is_some_and(|line| !line.trim().is_empty()) {
                lines.push(String::new());
            }
            lines.push(header);
            lines.extend(entries.iter().map(|(key, value)| format!("{key} = {value}")));
        }
        Some(start) => {
            let mut end = lines[start + 1..]
                .iter()
                .position(|line| line.trim_start().starts_with('['))
                .map_or(lines.len(), |offset| start + 1 + offset);
            // New keys go after the last non-blank line of the section.
            let mut insert_at = end;
            while insert_at > start + 1 && lines[insert_at - 1].trim().is_empty() {
                insert_at -= 1;
            }
            for (key, value) in entries {
                let line = format!("{key} = {value}");
                match (start + 1..end).find(|i| entry_key(&lines[*i]) == Some(*key)) {
                    Some(i) => lines[i] = line,
                    None => {
                        lines.insert(insert_at, line);
                        insert_at += 1;
                        end += 1;
                    }
                }
            }
        }
    }

    let mut updated = lines.join("\n");
    updated.push('\n');
    updated
}

fn entry_key(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.starts_with('#') || line.starts_with(';') {
        return None;
    }
    line.split_once('=').or_else(|| line.split_once(':')).map(|(key, _)| key.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_the_file_and_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".aws").join("credentials");

        upsert_profile(&path, "hcp", "AKIA1", "secret1").unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[hcp]\naws_access_key_id = AKIA1\naws_secret_access_key = secret1\n"
        );
    }

    #[test]
    fn updating_a_profile_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials");

        upsert_profile(&path, "hcp", "AKIA1", "secret1").unwrap();
        upsert_profile(&path, "hcp", "AKIA2", "secret2").unwrap();
        let once = fs::read_to_string(&path).unwrap();
        upsert_profile(&path, "hcp", "AKIA2", "secret2").unwrap();
        let twice = fs::read_to_string(&path).unwrap();

        assert_eq!(once, twice);
        assert_eq!(once, "[hcp]\naws_access_key_id = AKIA2\naws_secret_access_key = secret2\n");
    }

    #[test]
    fn other_profiles_and_keys_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials");
        fs::write(
            &path,
            "[default]\naws_access_key_id=DEFAULT\n\n[hcp]\nregion = us-east-1\naws_access_key_id=OLD\n\n[other]\nkey = value\n",
        )
        .unwrap();

        upsert_profile(&path, "hcp", "NEW", "SECRET").unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[default]\naws_access_key_id=DEFAULT\n\n[hcp]\nregion = us-east-1\naws_access_key_id = NEW\naws_secret_access_key = SECRET\n\n[other]\nkey = value\n"
        );
    }

    #[test]
    fn new_profile_is_appended_after_a_blank_line() {
        let section = upsert_section("[default]\nkey = value", "hcp", &[("a", "1")]);
        assert_eq!(section, "[default]\nkey = value\n\n[hcp]\na = 1\n");
    }
}
