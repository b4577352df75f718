//! Account management adapter: user lookup via `getent`, creation via
//! `useradd`, lingering via `loginctl`, runtime-directory provisioning.

use anyhow::{Context, Result, bail};
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use super::exec::{run_capture, run_status};
use super::AccountManager;

/// A resolved local account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

impl UserRecord {
    /// The user's private runtime directory (`/run/user/<uid>`).
    pub fn runtime_dir(&self) -> PathBuf {
        PathBuf::from(format!("/run/user/{}", self.uid))
    }
}

/// Where systemd records lingering users.
const LINGER_DIR: &str = "/var/lib/systemd/linger";

/// Live [`AccountManager`] backed by shadow-utils and logind.
pub struct Accounts;

impl AccountManager for Accounts {
    fn lookup_user(&self, name: &str) -> Result<Option<UserRecord>> {
        // getent exits 2 when the key does not exist; that is the defined
        // negative, not a failure.
        match run_capture("getent", &["passwd", name]) {
            Ok(line) => parse_passwd_line(&line).map(Some),
            Err(e) if e.exit_code() == Some(2) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("getent passwd {name} failed")),
        }
    }

    fn create_service_user(&self, name: &str) -> Result<UserRecord> {
        run_capture(
            "useradd",
            &["--create-home", "--user-group", "--shell", "/usr/sbin/nologin", name],
        )
        .with_context(|| format!("Failed to create user {name}"))?;

        self.lookup_user(name)?
            .with_context(|| format!("User {name} missing right after creation"))
    }

    fn lingering_enabled(&self, user: &str) -> Result<bool> {
        // logind drops one file per lingering user; checking it avoids
        // loginctl's "unknown user" failure mode for accounts that have
        // never logged in.
        Ok(Path::new(LINGER_DIR).join(user).exists())
    }

    fn enable_lingering(&self, user: &str) -> Result<()> {
        run_capture("loginctl", &["enable-linger", user])
            .map(|_| ())
            .with_context(|| format!("Failed to enable lingering for {user}"))
    }

    fn ensure_runtime_dir(&self, user: &UserRecord) -> Result<PathBuf> {
        let dir = user.runtime_dir();

        if !dir.is_dir() {
            // enable-linger normally creates it; nudge logind and fall
            // back to creating it ourselves.
            let _ = run_status("systemctl", &["start", &format!("user@{}.service", user.uid)]);
            if !dir.is_dir() {
                fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
        }

        let meta = fs::metadata(&dir)
            .with_context(|| format!("Failed to stat {}", dir.display()))?;

        if meta.uid() != user.uid {
            std::os::unix::fs::chown(&dir, Some(user.uid), Some(user.gid))
                .with_context(|| format!("Failed to chown {}", dir.display()))?;
        }
        if meta.permissions().mode() & 0o777 != 0o700 {
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))
                .with_context(|| format!("Failed to chmod {}", dir.display()))?;
        }

        Ok(dir)
    }
}

fn parse_passwd_line(line: &str) -> Result<UserRecord> {
    // name:password:uid:gid:gecos:home:shell
    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() < 6 {
        bail!("Unexpected passwd entry: {line:?}");
    }
    Ok(UserRecord {
        name: fields[0].to_string(),
        uid: fields[2]
            .parse()
            .with_context(|| format!("Bad uid in passwd entry: {line:?}"))?,
        gid: fields[3]
            .parse()
            .with_context(|| format!("Bad gid in passwd entry: {line:?}"))?,
        home: PathBuf::from(fields[5]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_passwd_entries() {
        let rec = parse_passwd_line("homestead:x:978:978:Homestead:/home/homestead:/usr/sbin/nologin")
            .unwrap();
        assert_eq!(rec.name, "homestead");
        assert_eq!(rec.uid, 978);
        assert_eq!(rec.gid, 978);
        assert_eq!(rec.home, PathBuf::from("/home/homestead"));
        assert_eq!(rec.runtime_dir(), PathBuf::from("/run/user/978"));
    }

    #[test]
    fn rejects_malformed_passwd_entries() {
        assert!(parse_passwd_line("short:line").is_err());
        assert!(parse_passwd_line("u:x:notanumber:1::/home/u:/bin/sh").is_err());
    }
}
