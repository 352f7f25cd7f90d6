// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use super::SourceState;
use crate::{
    actual::ActualStateEntry,
    entry_state::EntryState,
    entry_type_set::EntryTypeSet,
    error::{ApplyFailures, Error, Result},
    path::RelPath,
    persistent_state::{get_json, set_json, PersistentState, ENTRY_STATE_BUCKET},
    system::System,
};

use indicatif::ProgressBar;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Verdict of a pre-apply hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreApply {
    Apply,
    Skip,
}

/// Hook called before a target is applied.
///
/// Receives the target path, the target state, the last written state if
/// any, and the actual state.
pub type PreApplyHook<'a> = Box<
    dyn FnMut(&RelPath, &EntryState, Option<&EntryState>, &EntryState) -> Result<PreApply> + 'a,
>;

/// Options of [`SourceState::apply`] and [`SourceState::apply_all`].
#[derive(Default)]
pub struct ApplyOptions<'a> {
    /// Kinds of entries to apply.
    pub include: EntryTypeSet,

    /// Only apply these targets and everything below them, all if empty.
    pub targets: Vec<RelPath>,

    /// Collect failures instead of stopping at the first one.
    pub keep_going: bool,
    pub pre_apply: Option<PreApplyHook<'a>>,
    pub bar: Option<ProgressBar>,
}

impl<'a> ApplyOptions<'a> {
    pub fn with_pre_apply(
        mut self,
        hook: impl FnMut(&RelPath, &EntryState, Option<&EntryState>, &EntryState) -> Result<PreApply>
            + 'a,
    ) -> Self {
        self.pre_apply = Some(Box::new(hook));
        self
    }
}

impl SourceState {
    /// Reconcile one target path.
    ///
    /// Returns whether anything was changed. The state written is recorded
    /// in the persistent state whenever something changed.
    ///
    /// # Errors
    ///
    /// - Return [`Error::NotManaged`] if target has no entry.
    /// - Return any error from computing target state, reading actual state,
    ///   calling the pre-apply hook, or mutating the target system.
    #[instrument(skip(self, target_system, persistent_state, options), level = "debug")]
    pub fn apply(
        &self,
        target_system: &Arc<dyn System>,
        persistent_state: &dyn PersistentState,
        target_rel_path: &RelPath,
        options: &mut ApplyOptions<'_>,
    ) -> Result<bool> {
        let entry = self
            .get(target_rel_path)
            .ok_or_else(|| Error::NotManaged(target_rel_path.clone()))?;
        if !options.include.includes_source(entry) {
            debug!("skip {target_rel_path}, excluded by source filter");
            return Ok(false);
        }

        let env = self.target_env(target_system, target_rel_path);
        let target = entry.target_state_entry(&env)?;
        if !options.include.includes_target(&target) {
            debug!("skip {target_rel_path}, excluded by target filter");
            return Ok(false);
        }

        let dest_abs_path = env.dest_abs_path;
        if target.skip_apply(persistent_state, &dest_abs_path)? {
            return Ok(false);
        }

        let actual = ActualStateEntry::read(target_system, &dest_abs_path)?;
        let target_state = target.entry_state()?;

        if let (Some(hook), Some(target_state)) = (options.pre_apply.as_mut(), target_state.as_ref()) {
            let actual_state = actual.entry_state()?;
            let mut last_state: Option<EntryState> =
                get_json(persistent_state, ENTRY_STATE_BUCKET, dest_abs_path.as_str())?;

            // Target already holds, so the user did not change anything.
            if EntryState::equivalent(Some(target_state), Some(&actual_state))
                && !EntryState::equivalent(last_state.as_ref(), Some(target_state))
            {
                debug!("update last written state of {target_rel_path}");
                set_json(
                    persistent_state,
                    ENTRY_STATE_BUCKET,
                    dest_abs_path.as_str(),
                    target_state,
                )?;
                last_state = Some(target_state.clone());
            }

            if hook(target_rel_path, target_state, last_state.as_ref(), &actual_state)?
                == PreApply::Skip
            {
                info!("skip {target_rel_path}");
                return Ok(false);
            }
        }

        let changed = target.apply(target_system.as_ref(), persistent_state, &actual)?;
        if changed {
            if let Some(target_state) = target_state {
                set_json(
                    persistent_state,
                    ENTRY_STATE_BUCKET,
                    dest_abs_path.as_str(),
                    &target_state,
                )?;
            }
        }

        Ok(changed)
    }

    /// Reconcile every selected target path in apply order.
    ///
    /// Returns number of targets changed.
    ///
    /// # Errors
    ///
    /// - Return [`Error::NotManaged`] if a requested target matches nothing.
    /// - Return [`Error::Apply`] for the first failed target.
    /// - Return [`Error::ApplyFailures`] with every failure when
    ///   [`ApplyOptions::keep_going`] is set.
    #[instrument(skip_all, level = "debug")]
    pub fn apply_all(
        &self,
        target_system: &Arc<dyn System>,
        persistent_state: &dyn PersistentState,
        options: &mut ApplyOptions<'_>,
    ) -> Result<usize> {
        if let Some(unknown) = options
            .targets
            .iter()
            .find(|target| !self.entries.keys().any(|path| path.has_dir_prefix(target)))
        {
            return Err(Error::NotManaged(unknown.clone()));
        }

        let paths = self
            .target_rel_paths()
            .into_iter()
            .filter(|path| {
                options.targets.is_empty()
                    || options.targets.iter().any(|target| path.has_dir_prefix(target))
            })
            .collect::<Vec<_>>();

        if let Some(bar) = &options.bar {
            bar.set_length(paths.len() as u64);
        }

        let mut changed = 0;
        let mut failures = Vec::new();
        for path in paths {
            if let Some(bar) = &options.bar {
                bar.set_message(path.to_string());
            }

            match self.apply(target_system, persistent_state, &path, options) {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(error) => {
                    let error = Error::Apply {
                        path,
                        source: Box::new(error),
                    };
                    if !options.keep_going {
                        return Err(error);
                    }
                    warn!("{error}");
                    failures.push(error);
                }
            }

            if let Some(bar) = &options.bar {
                bar.inc(1);
            }
        }

        if !failures.is_empty() {
            return Err(ApplyFailures(failures).into());
        }

        info!("changed {changed} targets");
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lazy::sha256,
        persistent_state::MockPersistentState,
        source::tests::Fixture,
        system::DryRunSystem,
    };
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn apply_all_converges() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.source("dot_bashrc", "bash\n")?;
        fixture.source("private_dot_ssh/config", "Host *\n")?;
        fixture.source("dot_blank", " \n")?;
        let persistent = MockPersistentState::new();

        let state = fixture.read()?;
        let changed = state.apply_all(&fixture.system, &persistent, &mut ApplyOptions::default())?;
        assert_eq!(changed, 3);
        assert_eq!(fs::read_to_string(fixture.dest.join(".bashrc"))?, "bash\n");
        assert!(!fixture.dest.join(".blank").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(fixture.dest.join(".ssh"))?.permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }

        let last: Option<EntryState> = get_json(
            &persistent,
            ENTRY_STATE_BUCKET,
            fixture.dest_abs(".bashrc")?.as_str(),
        )?;
        assert_eq!(last, Some(EntryState::file(0o644, &sha256(b"bash\n"))));

        let dry_run = Arc::new(DryRunSystem::new(Arc::clone(&fixture.system)));
        let system: Arc<dyn System> = dry_run.clone();
        let state = fixture.read()?;
        assert_eq!(state.apply_all(&system, &persistent, &mut ApplyOptions::default())?, 0);
        assert!(!dry_run.modified());

        Ok(())
    }

    #[test]
    fn hook_sees_user_edits() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.source("dot_file", "X")?;
        let persistent = MockPersistentState::new();
        fixture
            .read()?
            .apply_all(&fixture.system, &persistent, &mut ApplyOptions::default())?;

        fixture.dest(".file", "edited")?;
        let mut seen = Vec::new();
        let mut options = ApplyOptions::default().with_pre_apply(|path, target, last, actual| {
            seen.push((
                path.to_string(),
                last.map(|last| last.equal(target)),
                actual.equal(target),
                actual.contents().map(<[u8]>::to_vec),
            ));
            Ok(PreApply::Skip)
        });

        let state = fixture.read()?;
        assert_eq!(state.apply_all(&fixture.system, &persistent, &mut options)?, 0);
        drop(options);

        assert_eq!(
            seen,
            vec![(".file".to_owned(), Some(true), false, Some(b"edited".to_vec()))]
        );
        assert_eq!(fs::read_to_string(fixture.dest.join(".file"))?, "edited");

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn last_written_state_updates_silently() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let fixture = Fixture::new()?;
        fixture.source("dot_file", "X")?;
        fixture.dest(".file", "X")?;
        fs::set_permissions(fixture.dest.join(".file"), fs::Permissions::from_mode(0o644))?;
        let persistent = MockPersistentState::new();

        let mut lasts = Vec::new();
        let mut options = ApplyOptions::default().with_pre_apply(|_, target, last, _| {
            lasts.push(last.map(|last| last.equal(target)));
            Ok(PreApply::Apply)
        });

        let state = fixture.read()?;
        assert_eq!(state.apply_all(&fixture.system, &persistent, &mut options)?, 0);
        drop(options);

        assert_eq!(lasts, vec![Some(true)]);
        let last: Option<EntryState> = get_json(
            &persistent,
            ENTRY_STATE_BUCKET,
            fixture.dest_abs(".file")?.as_str(),
        )?;
        assert_eq!(last, Some(EntryState::file(0o644, &sha256(b"X"))));

        Ok(())
    }

    #[test]
    fn filters_select_targets() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.source("dot_a", "a")?;
        fixture.source("dot_b/c", "c")?;
        fixture.source("run_fail.sh", "#!/bin/sh\nexit 1\n")?;
        let persistent = MockPersistentState::new();
        let state = fixture.read()?;

        let mut options = ApplyOptions {
            targets: vec![RelPath::new(".b")],
            ..Default::default()
        };
        assert_eq!(state.apply_all(&fixture.system, &persistent, &mut options)?, 2);
        assert!(fixture.dest.join(".b/c").exists());
        assert!(!fixture.dest.join(".a").exists());

        let mut options = ApplyOptions {
            include: EntryTypeSet::all() - EntryTypeSet::SCRIPTS,
            ..Default::default()
        };
        assert_eq!(state.apply_all(&fixture.system, &persistent, &mut options)?, 1);
        assert!(fixture.dest.join(".a").exists());

        let mut options = ApplyOptions {
            targets: vec![RelPath::new(".nope")],
            ..Default::default()
        };
        let result = state.apply_all(&fixture.system, &persistent, &mut options);
        assert!(matches!(result, Err(Error::NotManaged(path)) if path == RelPath::new(".nope")));

        Ok(())
    }

    #[test]
    fn keep_going_collects_failures() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.source("dot_bad1.tmpl", "{{ missing }}")?;
        fixture.source("dot_bad2.tmpl", "{{ missing }}")?;
        fixture.source("dot_good", "ok")?;
        let persistent = MockPersistentState::new();

        let state = fixture.read()?;
        let result = state.apply_all(&fixture.system, &persistent, &mut ApplyOptions::default());
        let Err(Error::Apply { path, .. }) = result else {
            anyhow::bail!("expected first failure, got {result:?}");
        };
        assert_eq!(path, RelPath::new(".bad1"));
        assert!(!fixture.dest.join(".good").exists());

        let mut options = ApplyOptions {
            keep_going: true,
            ..Default::default()
        };
        let result = state.apply_all(&fixture.system, &persistent, &mut options);
        let Err(Error::ApplyFailures(ApplyFailures(failures))) = result else {
            anyhow::bail!("expected collected failures, got {result:?}");
        };
        assert_eq!(failures.len(), 2);
        assert!(fixture.dest.join(".good").exists());

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn scripts_run_around_regular_entries() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.source("run_before_a.sh", "#!/bin/sh\ntest ! -e .file && echo before >> log\n")?;
        fixture.source("run_after_z.sh", "#!/bin/sh\ntest -e .file && echo after >> log\n")?;
        fixture.source("dot_file", "X")?;
        let persistent = MockPersistentState::new();

        let state = fixture.read()?;
        state.apply_all(&fixture.system, &persistent, &mut ApplyOptions::default())?;
        assert_eq!(fs::read_to_string(fixture.dest.join("log"))?, "before\nafter\n");

        Ok(())
    }
}
