#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BotCommand {
    Sql,
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CommandDef {
    command: BotCommand,
    names: &'static [&'static str],
    admin_only: bool,
    description: &'static str,
}

const COMMAND_DEFS: &[CommandDef] = &[
    CommandDef {
        command: BotCommand::Sql,
        names: &["sql"],
        admin_only: true,
        description: "Run SQL statements in a transaction",
    },
    CommandDef {
        command: BotCommand::Config,
        names: &["config"],
        admin_only: true,
        description: "Inspect or change stored settings",
    },
];

/// A command invocation: which command, and the unparsed rest of the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Invocation {
    pub command: BotCommand,
    pub args: String,
}

pub(crate) fn parse_command(prefix: &str, text: &str) -> Option<Invocation> {
    let body = text.trim_start().strip_prefix(prefix)?;

    COMMAND_DEFS.iter().find_map(|def| {
        def.names
            .iter()
            .find_map(|name| command_args(body, name))
            .map(|args| Invocation {
                command: def.command,
                args: args.to_string(),
            })
    })
}

pub(crate) fn requires_admin(command: BotCommand) -> bool {
    COMMAND_DEFS
        .iter()
        .find(|def| def.command == command)
        .is_some_and(|def| def.admin_only)
}

pub(crate) fn describe(command: BotCommand) -> &'static str {
    COMMAND_DEFS
        .iter()
        .find(|def| def.command == command)
        .map_or("", |def| def.description)
}

/// `Some(rest)` when `body` is `name` alone or followed by whitespace.
fn command_args<'a>(body: &'a str, name: &str) -> Option<&'a str> {
    let rest = body.strip_prefix(name)?;
    if rest.is_empty() {
        return Some(rest);
    }
    rest.starts_with(char::is_whitespace).then(|| rest.trim_start())
}
