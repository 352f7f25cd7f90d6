// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::Sandbox;

use dotwright::{
    entry_state::EntryState,
    error::Error,
    path::RelPath,
    persistent_state::{get_json, ENTRY_STATE_BUCKET},
    source::{AddOptions, ApplyOptions, PreApply},
};

use anyhow::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::fs;

#[test]
fn apply_converges_then_stays_put() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.source(".dotwrightdata.toml", "[git]\nemail = \"jane@doe.com\"\n")?;
    sandbox.source(
        "dot_gitconfig.tmpl",
        indoc! {"
            [user]
                email = {{ git.email }}
        "},
    )?;
    sandbox.source("private_dot_ssh/config", "Host *\n")?;
    sandbox.source("exact_dot_vim/vimrc", "set number\n")?;
    sandbox.source(".dotwrightremove", ".old_history\n")?;
    sandbox.dest(".vim/stale.vim", "\" stale\n")?;
    sandbox.dest(".old_history", "ls\n")?;

    assert!(sandbox.would_change()?);
    assert!(sandbox.apply()? > 0);

    assert_eq!(
        sandbox.read_dest(".gitconfig")?,
        "[user]\n    email = jane@doe.com\n"
    );
    assert_eq!(sandbox.read_dest(".ssh/config")?, "Host *\n");
    assert_eq!(sandbox.read_dest(".vim/vimrc")?, "set number\n");
    assert!(!sandbox.dest.join(".vim/stale.vim").exists());
    assert!(!sandbox.dest.join(".old_history").exists());

    assert!(!sandbox.would_change()?);
    assert_eq!(sandbox.apply()?, 0);

    Ok(())
}

#[test]
fn dry_run_touches_nothing() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.source("dot_profile", "export EDITOR=vi\n")?;

    assert!(sandbox.would_change()?);
    assert!(!sandbox.dest.join(".profile").exists());

    let key = sandbox.dest_abs(".profile")?;
    let recorded: Option<EntryState> =
        get_json(&sandbox.persistent, ENTRY_STATE_BUCKET, key.as_str())?;
    assert!(recorded.is_none());

    Ok(())
}

#[test]
fn create_never_overwrites() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.source("create_dot_profile", "default\n")?;

    sandbox.apply()?;
    assert_eq!(sandbox.read_dest(".profile")?, "default\n");

    sandbox.dest(".profile", "mine\n")?;
    sandbox.apply()?;
    assert_eq!(sandbox.read_dest(".profile")?, "mine\n");
    assert!(!sandbox.would_change()?);

    Ok(())
}

#[test]
fn user_edits_reach_pre_apply_hook() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.source("dot_bashrc", "alias ll='ls -l'\n")?;
    sandbox.apply()?;
    sandbox.dest(".bashrc", "alias ll='ls -la'\n")?;

    let state = sandbox.read()?;
    let mut edited = Vec::new();
    let mut options = ApplyOptions::default().with_pre_apply(|path, _, last, actual| {
        if last.is_some_and(|last| !actual.equal(last)) {
            edited.push(path.clone());
            return Ok(PreApply::Skip);
        }
        Ok(PreApply::Apply)
    });
    let changed = state.apply_all(&sandbox.system, &sandbox.persistent, &mut options)?;
    drop(options);

    assert_eq!(changed, 0);
    assert_eq!(edited, vec![RelPath::new(".bashrc")]);
    assert_eq!(sandbox.read_dest(".bashrc")?, "alias ll='ls -la'\n");

    Ok(())
}

#[test]
fn duplicate_targets_are_reported_together() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.source("dot_file", "")?;
    sandbox.source("dot_file.tmpl", "")?;
    sandbox.source("create_dot_file", "")?;

    let Err(error) = sandbox.read() else {
        anyhow::bail!("source state should not read");
    };
    assert_eq!(
        error.to_string(),
        ".file: duplicate source state entries (create_dot_file, dot_file, dot_file.tmpl)"
    );

    Ok(())
}

#[test]
fn version_floor_is_enforced() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.source(".dotwrightversion", "2.0.0\n")?;

    let Err(error) = sandbox.read() else {
        anyhow::bail!("source state should not read");
    };
    assert_eq!(
        error.to_string(),
        "source state requires version 2.0.0 or later, running version 1.0.0"
    );

    Ok(())
}

#[test]
fn ignored_paths_survive_exact_dirs() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.source(".dotwrightignore", ".config/app/cache\n")?;
    sandbox.source("dot_config/exact_app/settings.toml", "theme = \"dark\"\n")?;
    sandbox.dest(".config/app/cache", "keep me\n")?;
    sandbox.dest(".config/app/junk", "drop me\n")?;

    sandbox.apply()?;
    assert_eq!(sandbox.read_dest(".config/app/cache")?, "keep me\n");
    assert!(!sandbox.dest.join(".config/app/junk").exists());
    assert!(!sandbox.would_change()?);

    Ok(())
}

#[test]
fn keep_going_applies_the_rest() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.source("dot_broken.tmpl", "{{ missing }}\n")?;
    sandbox.source("dot_fine", "fine\n")?;

    let state = sandbox.read()?;
    let mut options = ApplyOptions {
        keep_going: true,
        ..Default::default()
    };
    let result = state.apply_all(&sandbox.system, &sandbox.persistent, &mut options);

    let Err(Error::ApplyFailures(failures)) = result else {
        anyhow::bail!("expected apply failures");
    };
    assert_eq!(failures.0.len(), 1);
    assert_eq!(sandbox.read_dest(".fine")?, "fine\n");
    assert!(!sandbox.dest.join(".broken").exists());

    Ok(())
}

#[cfg(unix)]
mod unix {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn scripts_run_every_time_or_once_per_contents() -> Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.source("run_once_install.sh", "#!/bin/sh\necho once >> once.log\n")?;
        sandbox.source("run_always.sh", "#!/bin/sh\necho always >> always.log\n")?;

        sandbox.apply()?;
        sandbox.apply()?;
        assert_eq!(sandbox.read_dest("once.log")?, "once\n");
        assert_eq!(sandbox.read_dest("always.log")?, "always\nalways\n");

        sandbox.source(
            "run_once_install.sh",
            "#!/bin/sh\n# revised\necho once >> once.log\n",
        )?;
        sandbox.apply()?;
        assert_eq!(sandbox.read_dest("once.log")?, "once\nonce\n");

        Ok(())
    }

    #[test]
    fn scripts_dir_runs_from_destination() -> Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.source(
            ".dotwrightscripts/run_setup.sh",
            "#!/bin/sh\necho ran > marker\n",
        )?;

        sandbox.apply()?;
        assert_eq!(sandbox.read_dest("marker")?, "ran\n");
        assert!(!sandbox.dest.join(".dotwrightscripts").exists());

        Ok(())
    }

    #[test]
    fn blank_symlink_template_removes_target() -> Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.source(".dotwrightdata.toml", "link = \"\"\n")?;
        sandbox.source("symlink_dot_vimrc.tmpl", "{{ link }}\n")?;
        std::os::unix::fs::symlink("old/vimrc", sandbox.dest.join(".vimrc"))?;

        sandbox.apply()?;
        assert!(fs::symlink_metadata(sandbox.dest.join(".vimrc")).is_err());
        assert!(!sandbox.would_change()?);

        Ok(())
    }

    #[test]
    fn modify_filter_rewrites_in_place() -> Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.dest(".conf", "color = old\n")?;
        sandbox.source("modify_dot_conf", "#!/bin/sh\nsed 's/old/new/'\n")?;

        sandbox.apply()?;
        assert_eq!(sandbox.read_dest(".conf")?, "color = new\n");
        assert!(!sandbox.would_change()?);

        Ok(())
    }

    #[test]
    fn symlinks_point_where_told() -> Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.source("symlink_dot_vimrc", "dotfiles/vimrc\n")?;

        sandbox.apply()?;
        assert_eq!(
            fs::read_link(sandbox.dest.join(".vimrc"))?,
            std::path::PathBuf::from("dotfiles/vimrc")
        );
        assert!(!sandbox.would_change()?);

        Ok(())
    }

    #[test]
    fn added_paths_apply_as_noop() -> Result<()> {
        let sandbox = Sandbox::new()?;
        sandbox.dest(".bashrc", "alias ll='ls -l'\n")?;
        sandbox.dest(".local/bin/tool", "#!/bin/sh\n")?;
        for (path, mode) in [
            (".bashrc", 0o644),
            (".local", 0o755),
            (".local/bin", 0o755),
            (".local/bin/tool", 0o755),
        ] {
            fs::set_permissions(sandbox.dest.join(path), fs::Permissions::from_mode(mode))?;
        }

        let state = sandbox.read()?;
        let paths = [
            sandbox.dest_abs(".bashrc")?,
            sandbox.dest_abs(".local/bin/tool")?,
        ];
        state.add(
            &sandbox.system,
            &sandbox.persistent,
            &paths,
            &AddOptions::default(),
        )?;
        assert!(sandbox.source.join("dot_bashrc").is_file());
        assert!(sandbox.source.join("dot_local/bin/executable_tool").is_file());
        assert!(!sandbox.would_change()?);

        // Re-adding parent as exact renames its source directory.
        let state = sandbox.read()?;
        let options = AddOptions {
            exact: true,
            ..Default::default()
        };
        state.add(
            &sandbox.system,
            &sandbox.persistent,
            &[sandbox.dest_abs(".local")?],
            &options,
        )?;
        assert!(sandbox.source.join("exact_dot_local/bin/executable_tool").is_file());
        assert!(!sandbox.source.join("dot_local").exists());
        assert!(!sandbox.would_change()?);

        Ok(())
    }
}
