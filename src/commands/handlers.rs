//! Built-in commands and what they do

use chrono::{DateTime, Local};
use tracing::info;

use crate::config::Persona;
use crate::hardware::HardwareLink;
use crate::state::{LanguageMode, SharedState};

use super::table::{CommandTable, TableError};

/// Result of running a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Speak this and keep listening for commands
    Reply(String),
    /// Speak this farewell, then shut the whole process down
    Exit(String),
}

/// Everything a command may read or change
pub struct CommandContext<'a> {
    pub shared: &'a SharedState,
    pub link: &'a HardwareLink,
    pub persona: &'a Persona,
    /// Number of voices the speech engine offers
    pub voice_count: usize,
    /// Wall-clock time the command was dispatched at
    pub now: DateTime<Local>,
}

/// Capability implemented by anything the command table can dispatch to
pub trait CommandHandler {
    fn execute(&self, ctx: &CommandContext<'_>) -> Outcome;
}

/// Every command the assistant understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Time,
    Date,
    Hello,
    HowAreYou,
    Creator,
    Name,
    SetTimer,
    ChangeVoice,
    SwitchLanguage,
    CenterHead,
    StartTracking,
    StopTracking,
    Exit,
}

impl CommandKind {
    /// Default phrase bindings, in tie-break order
    pub const BINDINGS: &'static [(&'static str, CommandKind)] = &[
        ("what time is it", CommandKind::Time),
        ("what is today's date", CommandKind::Date),
        ("hello", CommandKind::Hello),
        ("how are you", CommandKind::HowAreYou),
        ("who built you", CommandKind::Creator),
        ("what is your name", CommandKind::Name),
        ("set timer", CommandKind::SetTimer),
        ("change voice", CommandKind::ChangeVoice),
        ("switch language", CommandKind::SwitchLanguage),
        ("center your head", CommandKind::CenterHead),
        ("start tracking", CommandKind::StartTracking),
        ("stop tracking", CommandKind::StopTracking),
        ("exit", CommandKind::Exit),
    ];

    pub fn default_table() -> Result<CommandTable<CommandKind>, TableError> {
        CommandTable::new(Self::BINDINGS.to_vec())
    }
}

impl CommandHandler for CommandKind {
    fn execute(&self, ctx: &CommandContext<'_>) -> Outcome {
        let persona = ctx.persona;

        let reply = match self {
            CommandKind::Time => format!("The current time is {}.", ctx.now.format("%I:%M %p")),
            CommandKind::Date => format!("Today's date is {}.", ctx.now.format("%B %d, %Y")),
            CommandKind::Hello => persona.hello.clone(),
            CommandKind::HowAreYou => persona.how_are_you.clone(),
            CommandKind::Creator => format!("I was built by {}.", persona.creator),
            CommandKind::Name => format!("My name is {}.", persona.name),
            CommandKind::SetTimer => persona.timer_unavailable.clone(),
            CommandKind::ChangeVoice => {
                let index = ctx.shared.advance_voice(ctx.voice_count);
                info!(voice_index = index, "voice changed");
                "Voice changed.".to_string()
            }
            CommandKind::SwitchLanguage => {
                let mode = ctx.shared.toggle_language();
                info!(%mode, "language switched");
                match mode {
                    LanguageMode::Primary => "Switched to my primary language.".to_string(),
                    LanguageMode::Secondary => "Switched to my second language.".to_string(),
                }
            }
            CommandKind::CenterHead => {
                ctx.shared.center_head(ctx.link);
                "Looking straight ahead.".to_string()
            }
            CommandKind::StartTracking => {
                ctx.shared.set_tracking_enabled(true);
                "Face tracking on.".to_string()
            }
            CommandKind::StopTracking => {
                ctx.shared.set_tracking_enabled(false);
                "Face tracking off.".to_string()
            }
            CommandKind::Exit => return Outcome::Exit(persona.goodbye.clone()),
        };

        Outcome::Reply(reply)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::hardware::testing::RecordingPort;
    use crate::state::HeadPose;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 7, 15, 4, 0).unwrap()
    }

    fn run(kind: CommandKind, shared: &SharedState, link: &HardwareLink) -> Outcome {
        let persona = Persona::default();
        let ctx = CommandContext {
            shared,
            link,
            persona: &persona,
            voice_count: 2,
            now: fixed_now(),
        };
        kind.execute(&ctx)
    }

    #[test]
    fn test_default_table_is_valid() {
        let table = CommandKind::default_table().unwrap();
        assert_eq!(table.len(), CommandKind::BINDINGS.len());
    }

    #[test]
    fn test_time_reply_contains_formatted_time() {
        let outcome = run(CommandKind::Time, &SharedState::new(), &HardwareLink::disconnected());
        assert_eq!(outcome, Outcome::Reply("The current time is 03:04 PM.".to_string()));
    }

    #[test]
    fn test_date_reply() {
        let outcome = run(CommandKind::Date, &SharedState::new(), &HardwareLink::disconnected());
        assert_eq!(outcome, Outcome::Reply("Today's date is March 07, 2024.".to_string()));
    }

    #[test]
    fn test_creator_reply_uses_persona() {
        let outcome = run(CommandKind::Creator, &SharedState::new(), &HardwareLink::disconnected());
        assert_eq!(outcome, Outcome::Reply("I was built by the Robo workshop.".to_string()));
    }

    #[test]
    fn test_switch_language_toggles_shared_mode() {
        let shared = SharedState::new();
        let link = HardwareLink::disconnected();

        run(CommandKind::SwitchLanguage, &shared, &link);
        assert_eq!(shared.language(), LanguageMode::Secondary);
        run(CommandKind::SwitchLanguage, &shared, &link);
        assert_eq!(shared.language(), LanguageMode::Primary);
    }

    #[test]
    fn test_change_voice_cycles() {
        let shared = SharedState::new();
        let link = HardwareLink::disconnected();

        run(CommandKind::ChangeVoice, &shared, &link);
        assert_eq!(shared.voice_index(), 1);
        run(CommandKind::ChangeVoice, &shared, &link);
        assert_eq!(shared.voice_index(), 0);
    }

    #[test]
    fn test_center_head_recenters_and_sends() {
        let port = RecordingPort::default();
        let link = HardwareLink::from_writer(port.clone(), "test");
        let shared = SharedState::new();
        shared.move_head(&link, |pose| {
            pose.pan = 110;
            pose.tilt = 72;
        });

        run(CommandKind::CenterHead, &shared, &link);

        assert_eq!(shared.pose(), HeadPose::default());
        assert_eq!(port.last_frame_for("pan").unwrap(), "pan:90");
        assert_eq!(port.last_frame_for("tilt").unwrap(), "tilt:90");
    }

    #[test]
    fn test_tracking_toggles() {
        let shared = SharedState::new();
        let link = HardwareLink::disconnected();

        run(CommandKind::StopTracking, &shared, &link);
        assert!(!shared.tracking_enabled());
        run(CommandKind::StartTracking, &shared, &link);
        assert!(shared.tracking_enabled());
    }

    #[test]
    fn test_exit_requests_shutdown() {
        let outcome = run(CommandKind::Exit, &SharedState::new(), &HardwareLink::disconnected());
        assert_eq!(outcome, Outcome::Exit("Goodbye!".to_string()));
    }
}
