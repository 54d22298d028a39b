//! Raw bytes to typed commands, and back.

use std::sync::Arc;

use crate::message::LineParts;
use crate::{frame, Command, CommandRegistry, ProtocolError, Unparsed};

/// Frames raw input and parses each line through a [`CommandRegistry`].
#[derive(Clone)]
pub struct CommandParser {
    registry: Arc<CommandRegistry>,
}

impl CommandParser {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Parses every line in `raw`.
    ///
    /// - A registered code yields its typed command.
    /// - An unknown code yields [`Unparsed`] carrying the raw line.
    /// - A line that fails its command's parser is logged and skipped;
    ///   the other lines are unaffected.
    pub fn parse(&self, raw: &[u8]) -> Vec<Box<dyn Command>> {
        frame(raw)
            .iter()
            .filter_map(|line| match self.parse_line(line) {
                Ok(command) => command,
                Err(e) => {
                    tracing::debug!(%line, error = %e, "skipping unparsable line");
                    None
                }
            })
            .collect()
    }

    /// Parses a single, already framed line.
    ///
    /// Returns `Ok(None)` for a blank line.
    ///
    /// # Errors
    /// Whatever the command's own parser rejects.
    pub fn parse_line(
        &self,
        line: &str,
    ) -> Result<Option<Box<dyn Command>>, ProtocolError> {
        let Some(parts) = LineParts::split(line) else {
            return Ok(None);
        };

        let mut command = match self.registry.instantiate(parts.code) {
            Some(command) => command,
            None => Box::new(Unparsed::default()),
        };
        command.parse(line)?;
        Ok(Some(command))
    }

    /// Writes `command` as one line, without terminator.
    pub fn serialize(command: &dyn Command) -> String {
        command.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Nick, User};

    fn parser() -> CommandParser {
        CommandParser::new(Arc::new(CommandRegistry::with_builtins()))
    }

    #[test]
    fn test_parse_nick_user_buffer_yields_two_commands() {
        let commands = parser().parse(b"NICK bob\r\nUSER b 0 * :Bob\r\n");
        let codes: Vec<&str> = commands.iter().map(|c| c.code()).collect();
        assert_eq!(codes, vec!["NICK", "USER"]);
        assert_eq!(commands[0].downcast_ref::<Nick>().unwrap().nickname, "bob");
        assert_eq!(commands[1].downcast_ref::<User>().unwrap().realname, "Bob");
    }

    #[test]
    fn test_parse_lower_case_code_is_recognised() {
        let commands = parser().parse(b"nick bob\r\n");
        assert!(commands[0].is::<Nick>());
    }

    #[test]
    fn test_parse_unknown_code_yields_unparsed() {
        let commands = parser().parse(b"CAP LS 302\r\n");
        let unparsed = commands[0].downcast_ref::<Unparsed>().unwrap();
        assert_eq!(unparsed.line, "CAP LS 302");
        assert_eq!(unparsed.code, "CAP");
    }

    #[test]
    fn test_parse_bad_line_is_skipped_siblings_survive() {
        let commands = parser().parse(b"NICK\r\nPING :x\r\nJOIN\r\nQUIT\r\n");
        let codes: Vec<&str> = commands.iter().map(|c| c.code()).collect();
        assert_eq!(codes, vec!["PING", "QUIT"]);
    }

    #[test]
    fn test_parse_source_prefix_is_not_the_code() {
        let commands = parser().parse(b":bob!b@h NICK robert\r\n");
        let nick = commands[0].downcast_ref::<Nick>().unwrap();
        assert_eq!(nick.nickname, "robert");
        assert_eq!(nick.source.as_deref(), Some("bob!b@h"));
    }

    #[test]
    fn test_parse_blank_lines_produce_nothing() {
        assert!(parser().parse(b"   \r\n\r\n ").is_empty());
    }

    #[test]
    fn test_serialize_delegates_to_write() {
        let nick = Nick::new("bob");
        assert_eq!(CommandParser::serialize(&nick), "NICK bob");
    }
}
