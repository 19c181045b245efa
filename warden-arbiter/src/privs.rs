//! Umask and privilege dropping (SPEC_FULL.md §4.1, §6
//! `--user`/`--group`/`--umask`): applied once, after listeners are bound
//! (binding a low port may need root) and before the first worker forks,
//! so every worker inherits the dropped identity. Group before user,
//! matching the pack's own ordering (other_examples `connate/src/spawn.rs`'s
//! `setgid` before `setuid`, `guest-init/src/workload.rs`'s
//! clear-then-drop sequence).

use std::ffi::CString;

use nix::sys::stat::{umask, Mode};
use nix::unistd::{initgroups, setgid, setuid, Group, User};

use crate::error::ArbiterError;

/// Apply the configured umask, then drop to `group`/`user` if set. A
/// `group` with no `user` only changes the gid; a `user` with no
/// explicit `group` drops to that user's primary group.
pub fn apply(user: Option<&str>, group: Option<&str>, raw_umask: Option<u32>) -> Result<(), ArbiterError> {
    if let Some(mask) = raw_umask {
        umask(Mode::from_bits_truncate(mask));
    }

    let explicit_gid = group.map(lookup_group).transpose()?.map(|g| g.gid);

    match user {
        Some(name) => {
            let account = lookup_user(name)?;
            let gid = explicit_gid.unwrap_or(account.gid);
            let cname = CString::new(name).map_err(|_| ArbiterError::UnknownIdentity(name.to_string()))?;
            initgroups(&cname, gid).map_err(ArbiterError::Sys)?;
            setgid(gid).map_err(ArbiterError::Sys)?;
            setuid(account.uid).map_err(ArbiterError::Sys)?;
        }
        None => {
            if let Some(gid) = explicit_gid {
                setgid(gid).map_err(ArbiterError::Sys)?;
            }
        }
    }

    Ok(())
}

fn lookup_user(name: &str) -> Result<User, ArbiterError> {
    User::from_name(name)
        .map_err(ArbiterError::Sys)?
        .ok_or_else(|| ArbiterError::UnknownIdentity(name.to_string()))
}

fn lookup_group(name: &str) -> Result<Group, ArbiterError> {
    Group::from_name(name)
        .map_err(ArbiterError::Sys)?
        .ok_or_else(|| ArbiterError::UnknownIdentity(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_user_resolves_root() {
        let account = lookup_user("root").unwrap();
        assert_eq!(account.uid.as_raw(), 0);
    }

    #[test]
    fn lookup_user_rejects_unknown_name() {
        assert!(matches!(
            lookup_user("definitely-not-a-real-account"),
            Err(ArbiterError::UnknownIdentity(_))
        ));
    }

    #[test]
    fn lookup_group_resolves_root() {
        let group = lookup_group("root").unwrap();
        assert_eq!(group.gid.as_raw(), 0);
    }
}
