use std::{collections::HashMap, sync::Arc};

use sarah_common::BotType;

use crate::{props::CommandProps, task::ScheduledTaskProps};

/// Registry of command and scheduled task blueprints, grouped by bot type.
///
/// Fill it during start-up and hand it to the runner; it is read-only from
/// then on.
#[derive(Debug, Default, Clone)]
pub struct Stash {
    commands: HashMap<BotType, Vec<Arc<CommandProps>>>,
    tasks: HashMap<BotType, Vec<Arc<ScheduledTaskProps>>>,
}

impl Stash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_command_props(&mut self, props: CommandProps) -> &mut Self {
        self.commands
            .entry(props.bot_type().clone())
            .or_default()
            .push(Arc::new(props));
        self
    }

    pub fn add_scheduled_task_props(&mut self, props: ScheduledTaskProps) -> &mut Self {
        self.tasks
            .entry(props.bot_type().clone())
            .or_default()
            .push(Arc::new(props));
        self
    }

    /// Command blueprints for `bot_type`, in registration order.
    pub fn command_props(&self, bot_type: &BotType) -> &[Arc<CommandProps>] {
        self.commands.get(bot_type).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn scheduled_task_props(&self, bot_type: &BotType) -> &[Arc<ScheduledTaskProps>] {
        self.tasks.get(bot_type).map(Vec::as_slice).unwrap_or_default()
    }

    /// Move every blueprint of `other` into this stash, after existing ones.
    pub fn merge(&mut self, other: Stash) {
        for (bot_type, props) in other.commands {
            self.commands.entry(bot_type).or_default().extend(props);
        }
        for (bot_type, props) in other.tasks {
            self.tasks.entry(bot_type).or_default().extend(props);
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::command::CommandResponse,
    };

    fn command(bot: &str, id: &str) -> CommandProps {
        CommandProps::builder()
            .bot_type(bot)
            .identifier(id)
            .match_fn(|_| false)
            .instruction("")
            .func(|_| async { Ok(CommandResponse::empty()) })
            .build()
            .unwrap()
    }

    #[test]
    fn groups_by_bot_type_in_order() {
        let mut stash = Stash::new();
        stash
            .add_command_props(command("slack", "a"))
            .add_command_props(command("gitter", "x"))
            .add_command_props(command("slack", "b"));

        let ids: Vec<_> = stash
            .command_props(&BotType::from("slack"))
            .iter()
            .map(|p| p.identifier().to_string())
            .collect();
        assert_eq!(ids, ["a", "b"]);
        assert!(stash.command_props(&BotType::from("xmpp")).is_empty());
        assert!(stash.scheduled_task_props(&BotType::from("slack")).is_empty());
    }

    #[test]
    fn merge_appends() {
        let mut first = Stash::new();
        first.add_command_props(command("slack", "a"));
        let mut second = Stash::new();
        second.add_command_props(command("slack", "b"));

        first.merge(second);
        assert_eq!(first.command_props(&BotType::from("slack")).len(), 2);
    }
}
