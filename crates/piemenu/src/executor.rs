use crate::action::{Action, ActionKind, KeyChord};
use pietool::keys::{KeySynth, KeyTapError};
use pietool::spawn::{SpawnError, Spawner};
use pietool::wm::ShellCommand;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("action has no command to run")]
    EmptyCommand,
    #[error(transparent)]
    KeyTap(#[from] KeyTapError),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

/// Runs one action through the matching OS capability.
///
/// Exec actions count as done once the process is handed to the spawner;
/// their exit status only reaches the log.
pub struct ActionExecutor {
    keys: Box<dyn KeySynth>,
    spawner: Box<dyn Spawner>,
}

impl ActionExecutor {
    pub fn new(keys: Box<dyn KeySynth>, spawner: Box<dyn Spawner>) -> Self {
        Self { keys, spawner }
    }

    pub fn execute(&mut self, action: &Action) -> Result<(), ExecError> {
        match &action.kind {
            ActionKind::Keyboard { keys } => self.tap(keys),
            ActionKind::Exec { command, args } => self.exec(command, args),
        }
    }

    fn tap(&mut self, chord: &KeyChord) -> Result<(), ExecError> {
        log::info!(
            "Executing key tap: {} with modifiers {:?}",
            chord.main(),
            chord.modifiers()
        );
        self.keys.key_tap(chord.main(), chord.modifiers())?;
        Ok(())
    }

    fn exec(&mut self, command: &str, args: &[String]) -> Result<(), ExecError> {
        let line = command_line(command, args);
        if line.trim().is_empty() {
            return Err(ExecError::EmptyCommand);
        }
        log::info!("Executing command: {}", line);
        self.spawner.spawn(&line)?;
        Ok(())
    }
}

/// `command` followed by `args`, space-joined as given.
pub fn command_line(command: &str, args: &[String]) -> ShellCommand {
    if args.is_empty() {
        ShellCommand::new(command)
    } else {
        ShellCommand::new(format!("{} {}", command, args.join(" ")))
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::{FakeKeys, FakeSpawner, Recorder};
    use super::*;
    use pietool::keys::Modifier;
    use std::collections::BTreeSet;

    fn executor(recorder: &Recorder, fail_keys: bool) -> ActionExecutor {
        ActionExecutor::new(
            Box::new(FakeKeys {
                recorder: recorder.clone(),
                fail: fail_keys,
            }),
            Box::new(FakeSpawner {
                recorder: recorder.clone(),
            }),
        )
    }

    fn keyboard(keys: serde_json::Value) -> Action {
        Action::from_value(serde_json::json!({
            "name": "K", "icon": "k", "type": "keyboard", "keys": keys
        }))
        .unwrap()
    }

    #[test]
    fn test_keyboard_forms_tap_the_same_chord() {
        let recorder = Recorder::default();
        let mut exec = executor(&recorder, false);

        for keys in [
            serde_json::json!(["c", "control"]),
            serde_json::json!("control+c"),
            serde_json::json!("c+control"),
        ] {
            exec.execute(&keyboard(keys)).unwrap();
        }

        let expected = ("c".to_string(), BTreeSet::from([Modifier::Control]));
        assert_eq!(*recorder.taps.lock(), vec![expected.clone(), expected.clone(), expected]);
    }

    #[test]
    fn test_key_tap_failure_is_reported() {
        let recorder = Recorder::default();
        let mut exec = executor(&recorder, true);
        let err = exec.execute(&keyboard(serde_json::json!("alt+tab"))).unwrap_err();
        assert!(matches!(err, ExecError::KeyTap(_)));
    }

    #[test]
    fn test_exec_joins_args() {
        let recorder = Recorder::default();
        let mut exec = executor(&recorder, false);

        let mut action = Action::exec("Open", "folder", "xdg-open");
        action.kind = ActionKind::Exec {
            command: "xdg-open".to_string(),
            args: vec!["/home".to_string(), "--verbose".to_string()],
        };
        exec.execute(&action).unwrap();
        exec.execute(&Action::exec("Notepad", "file-text", "notepad.exe")).unwrap();

        assert_eq!(
            *recorder.spawned.lock(),
            vec!["xdg-open /home --verbose".to_string(), "notepad.exe".to_string()]
        );
    }

    #[test]
    fn test_exec_rejects_empty_line() {
        let recorder = Recorder::default();
        let mut exec = executor(&recorder, false);
        let action = Action::exec("Nothing", "x", "   ");
        assert!(matches!(exec.execute(&action), Err(ExecError::EmptyCommand)));
        assert!(recorder.spawned.lock().is_empty());
    }
}
