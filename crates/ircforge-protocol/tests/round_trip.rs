//! Every built-in command's output must parse back into the same command
//! through the public parser.

use std::sync::Arc;

use ircforge_protocol::{
    Command, CommandParser, CommandRegistry, Invite, Join, Mode, Nick, Notice,
    Part, Ping, Pong, Privmsg, Quit, Topic, User,
};

fn parser() -> CommandParser {
    CommandParser::new(Arc::new(CommandRegistry::with_builtins()))
}

fn reparse(command: &dyn Command) -> String {
    let line = CommandParser::serialize(command);
    let parsed = parser().parse(line.as_bytes());
    assert_eq!(parsed.len(), 1, "{line:?} produced {} commands", parsed.len());
    assert_eq!(parsed[0].code(), command.code());
    parsed[0].write()
}

#[test]
fn test_builtin_commands_survive_write_then_parse() {
    let commands: Vec<Box<dyn Command>> = vec![
        Box::new(Nick::new("bob").with_source("b!u@h")),
        Box::new(User::new("b", "Bob Smith")),
        Box::new(Ping::new("irc.example")),
        Box::new(Pong::reply("irc.example", "12345")),
        Box::new(Quit {
            source: Some("b!u@h".into()),
            reason: Some("Client exited".into()),
        }),
        Box::new(Join::new("#rust").with_source("b!u@h")),
        Box::new(Part::new("#rust", None)),
        Box::new(Topic::new("#rust", Some("Rust talk".into()))),
        Box::new(Mode::new("#rust", "+kl", vec!["secret".into(), "10".into()])),
        Box::new(Invite::new("alice", "#rust").with_source("b!u@h")),
        Box::new(Privmsg::new("#rust", "hello there")),
        Box::new(Notice::new("alice", ":)")),
    ];

    for command in &commands {
        let line = command.write();
        assert_eq!(reparse(&**command), line);
    }
}

#[test]
fn test_typed_fields_survive_write_then_parse() {
    let original = Privmsg::new("#rust", "  spaced  out ").with_source("b!u@h");
    let parsed = parser().parse(original.write().as_bytes());
    assert_eq!(parsed[0].downcast_ref::<Privmsg>(), Some(&original));
}

#[test]
fn test_custom_command_registered_at_runtime_is_used() {
    #[derive(Debug, Default)]
    struct Away {
        message: Option<String>,
    }

    impl Command for Away {
        fn code(&self) -> &str {
            "AWAY"
        }
        fn parse(&mut self, line: &str) -> Result<(), ircforge_protocol::ProtocolError> {
            self.message = line.split_once(':').map(|(_, m)| m.to_owned());
            Ok(())
        }
        fn write(&self) -> String {
            match &self.message {
                Some(m) => format!("AWAY :{m}"),
                None => "AWAY".to_owned(),
            }
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    let registry = Arc::new(CommandRegistry::with_builtins());
    registry.register_default::<Away>();
    let parser = CommandParser::new(registry);

    let parsed = parser.parse(b"away :lunch\r\n");
    let away = parsed[0].downcast_ref::<Away>().expect("typed AWAY");
    assert_eq!(away.message.as_deref(), Some("lunch"));
}
