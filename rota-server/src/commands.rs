//! Text command grammar for chat front ends.
//!
//! Patterns are tried in order and the first match wins. Parsing is pure;
//! [`execute`] is where commands touch the engine.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use rota_core::{
    AllocationOutcome, AllocationRequest, Directory, DirectoryEdit, RefusalReason,
};
use rota_model::{DeliveryContext, RequesterId, ResourceKind, normalize_owner};

use crate::infra::app_state::AppState;

/// Largest edit distance accepted when resolving a typed owner name.
pub const MAX_OWNER_DISTANCE: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Next(ResourceKind),
    Done { value: String },
    Priority { owner: String, remaining: u32, stop_after: bool },
    Disable { owner: String },
    Enable { owner: String },
    Status,
    /// Which owner contributed a value.
    Who { value: String },
    /// The requester's own counts for today.
    Activity,
}

impl Command {
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Command::Priority { .. } | Command::Disable { .. } | Command::Enable { .. }
        )
    }
}

type Builder = fn(&Captures<'_>) -> Option<Command>;

static GRAMMAR: Lazy<Vec<(Regex, Builder)>> = Lazy::new(|| {
    let rules: [(&str, Builder); 8] = [
        (r"(?i)^next\s+(alias|username|number|phone)$", |caps| {
            caps[1].parse().ok().map(Command::Next)
        }),
        (r"(?i)^done\s+(\S+)$", |caps| {
            Some(Command::Done {
                value: caps[1].to_string(),
            })
        }),
        (r"(?i)^priority\s+(\S+)\s+(\d+)(?:\s+(stop))?$", |caps| {
            Some(Command::Priority {
                owner: caps[1].to_string(),
                remaining: caps[2].parse().ok()?,
                stop_after: caps.get(3).is_some(),
            })
        }),
        (r"(?i)^disable\s+(\S+)$", |caps| {
            Some(Command::Disable {
                owner: caps[1].to_string(),
            })
        }),
        (r"(?i)^enable\s+(\S+)$", |caps| {
            Some(Command::Enable {
                owner: caps[1].to_string(),
            })
        }),
        (r"(?i)^status$", |_| Some(Command::Status)),
        (r"(?i)^who(?:\s+is\s+using)?\s+(\S+)$", |caps| {
            Some(Command::Who {
                value: caps[1].to_string(),
            })
        }),
        (r"(?i)^my\s+(?:detail|stats)$", |_| Some(Command::Activity)),
    ];

    rules
        .into_iter()
        .filter_map(|(pattern, build)| match Regex::new(pattern) {
            Ok(regex) => Some((regex, build)),
            Err(err) => {
                tracing::error!(pattern, error = %err, "invalid command pattern");
                None
            }
        })
        .collect()
});

/// Parse one line of chat text. `None` means no rule matched.
pub fn parse(text: &str) -> Option<Command> {
    let text = text.trim();
    GRAMMAR
        .iter()
        .find_map(|(regex, build)| regex.captures(text).and_then(|caps| build(&caps)))
}

/// Resolve a typed owner name: exact normalized match first, then the
/// closest name within [`MAX_OWNER_DISTANCE`] edits.
pub fn resolve_owner(directory: &Directory, typed: &str) -> Option<String> {
    if let Some(owner) = directory.owner(typed) {
        return Some(owner.key());
    }

    let wanted = normalize_owner(typed);
    let mut best: Option<(usize, String)> = None;
    for key in directory.owner_keys() {
        let distance = strsim::levenshtein(&wanted, &key);
        if distance > MAX_OWNER_DISTANCE {
            continue;
        }
        if best.as_ref().is_none_or(|(current, _)| distance < *current) {
            best = Some((distance, key));
        }
    }

    if let Some((distance, key)) = &best {
        debug!(typed, resolved = %key, distance, "fuzzy owner match");
    }
    best.map(|(_, key)| key)
}

/// Values that look like phone numbers are cleared as numbers, anything
/// else as an alias.
fn kind_of_value(value: &str) -> ResourceKind {
    let looks_numeric = value
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | '.'))
        && value.chars().any(|c| c.is_ascii_digit());
    if looks_numeric {
        ResourceKind::Number
    } else {
        ResourceKind::Alias
    }
}

/// Run a parsed command and produce the reply text.
pub async fn execute(
    state: &AppState,
    command: Command,
    requester: RequesterId,
    context: DeliveryContext,
) -> String {
    if command.requires_admin() && !state.config().commands.is_admin(requester) {
        return "This command is for admins only.".to_string();
    }

    let engine = state.engine();
    match command {
        Command::Next(kind) => {
            let outcome = state
                .allocate(AllocationRequest::new(requester, kind, context))
                .await;
            describe_outcome(kind, &outcome)
        }
        Command::Done { value } => {
            let kind = kind_of_value(&value);
            match engine.clear_obligation(requester, kind, &value).await {
                Ok(cleared) if cleared.lifted_ban => {
                    format!("Marked {} as done. Your ban is lifted.", cleared.item.value)
                }
                Ok(cleared) => format!("Marked {} as done.", cleared.item.value),
                Err(err) if err.is_not_found() => format!("{value} is not pending for you."),
                Err(err) => format!("Could not clear {value}: {err}"),
            }
        }
        Command::Priority {
            owner,
            remaining,
            stop_after,
        } => {
            let directory = engine.directory().await;
            let Some(key) = resolve_owner(&directory, &owner) else {
                return format!("No owner named {owner}.");
            };
            match engine.set_priority(&key, remaining, stop_after).await {
                Ok(()) if stop_after => {
                    format!("Priority set for {key}: {remaining} more, then disabled.")
                }
                Ok(()) => format!("Priority set for {key}: {remaining} more."),
                Err(err) => format!("Could not set priority: {err}"),
            }
        }
        Command::Disable { owner } => set_disabled(state, &owner, true).await,
        Command::Enable { owner } => set_disabled(state, &owner, false).await,
        Command::Status => describe_status(state).await,
        Command::Who { value } => match engine.lookup_owner(&value).await {
            Some(found) => format!("{} {} belongs to {}.", found.kind, found.value, found.owner),
            None => format!("Nobody contributed {value}."),
        },
        Command::Activity => match engine.requester_activity(requester).await {
            Ok(activity) => format!(
                "Today ({}): {} alias requests, {} number requests.",
                activity.logical_day.date(),
                activity.aliases,
                activity.numbers
            ),
            Err(err) => format!("Could not read your activity: {err}"),
        },
    }
}

async fn set_disabled(state: &AppState, owner: &str, disabled: bool) -> String {
    let engine = state.engine();
    let directory = engine.directory().await;
    let Some(key) = resolve_owner(&directory, owner) else {
        return format!("No owner named {owner}.");
    };
    let edit = DirectoryEdit::SetOwnerDisabled {
        name: key.clone(),
        disabled,
    };
    match engine.edit_directory(edit).await {
        Ok(_) if disabled => format!("{key} disabled."),
        Ok(_) => format!("{key} enabled."),
        Err(err) => format!("Could not update {key}: {err}"),
    }
}

pub fn describe_outcome(kind: ResourceKind, outcome: &AllocationOutcome) -> String {
    match outcome {
        AllocationOutcome::Issued(issued) => format!("Your {kind}: {}", issued.value),
        AllocationOutcome::PoolExhausted => format!("No {kind} is available right now."),
        AllocationOutcome::Refused(reason) => describe_refusal(reason),
    }
}

pub fn describe_refusal(reason: &RefusalReason) -> String {
    match reason {
        RefusalReason::PermanentlyBanned => "You are banned.".to_string(),
        RefusalReason::TemporarilyBanned { until } => {
            format!("You are banned until {} UTC.", until.format("%H:%M"))
        }
        RefusalReason::DailyAllotmentReached { used, limit } => format!(
            "You have used {used} of {limit} numbers today. Request more aliases to unlock numbers."
        ),
        RefusalReason::WindowLimitReached { limit, .. } => {
            format!("You have taken {limit} numbers recently. Try again later.")
        }
    }
}

async fn describe_status(state: &AppState) -> String {
    let status = state.engine().status().await;
    let mut lines = vec![format!(
        "Day {} (directory rev {})",
        status.logical_day.date(),
        status.directory_revision
    )];
    for pool in &status.pools {
        lines.push(format!(
            "{}: {} owners, {} values, next {}, {} pending",
            pool.kind,
            pool.owners.len(),
            pool.values,
            pool.due_owner.as_deref().unwrap_or("-"),
            pool.pending
        ));
    }
    for entry in &status.priority {
        lines.push(format!("priority {}: {} left", entry.owner, entry.remaining));
    }
    if status.active_temp_bans > 0 {
        lines.push(format!("{} active bans", status.active_temp_bans));
    }
    lines.join("\n")
}
