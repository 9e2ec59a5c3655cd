use serde::Deserialize;

use pollbot_core::{NewPoll, PollDefaults, PollId};

/// Form body Mattermost posts when the slash command is invoked.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct SlashCommandForm {
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub text: Option<String>,
    pub command: Option<String>,
    pub team_id: Option<String>,
}

/// JSON body of an interactive button press.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ActionPayload {
    pub user_id: String,
    #[serde(default)]
    pub team_id: Option<String>,
    pub context: ActionContext,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ActionContext {
    pub poll_id: ExternalId,
    #[serde(default)]
    pub vote: Option<i64>,
}

/// Poll ids round-trip through Mattermost and may come back as numbers or strings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ExternalId {
    Number(i64),
    Text(String),
}

impl ExternalId {
    pub fn poll_id(&self) -> Option<PollId> {
        match self {
            Self::Number(value) => Some(PollId(*value)),
            Self::Text(value) => PollId::parse_external(value),
        }
    }
}

/// Structured form of a poll command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollArguments {
    pub message: String,
    pub vote_options: Vec<String>,
    pub progress: bool,
    pub public: bool,
    pub bars: bool,
    pub max_votes: u32,
    /// `None` when the command did not name a locale.
    pub locale: Option<String>,
}

impl PollArguments {
    pub fn secret(&self) -> bool {
        !self.progress
    }

    pub fn into_new_poll(
        self,
        creator_id: impl Into<String>,
        locale: impl Into<String>,
    ) -> NewPoll {
        let secret = self.secret();
        NewPoll::new(creator_id, self.message)
            .locale(locale)
            .options(self.vote_options)
            .secret(secret)
            .public(self.public)
            .max_votes(self.max_votes)
            .bars(self.bars)
    }
}

const SEPARATOR: &str = "--";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Keyword {
    Secret,
    NoProgress,
    Progress,
    Public,
    Anonym,
    Bars,
    NoBars,
    Votes,
    Locale,
}

const KEYWORDS: [Keyword; 9] = [
    Keyword::Secret,
    Keyword::NoProgress,
    Keyword::Progress,
    Keyword::Public,
    Keyword::Anonym,
    Keyword::Bars,
    Keyword::NoBars,
    Keyword::Votes,
    Keyword::Locale,
];

impl Keyword {
    fn matches(self, segment: &str) -> bool {
        match self {
            Self::Secret => segment == "secret",
            Self::NoProgress => segment == "noprogress",
            Self::Progress => segment == "progress",
            Self::Public => segment == "public",
            Self::Anonym => segment == "anonym",
            Self::Bars => segment == "bars",
            Self::NoBars => segment == "nobars",
            Self::Votes => {
                segment.strip_prefix("votes=").is_some_and(|value| value.parse::<i64>().is_ok())
            }
            Self::Locale => segment == "locale" || segment.starts_with("locale="),
        }
    }

    fn apply(self, segment: &str, arguments: &mut PollArguments, defaults: &PollDefaults) {
        match self {
            Self::Secret | Self::NoProgress => arguments.progress = false,
            Self::Progress => arguments.progress = true,
            Self::Public => arguments.public = true,
            Self::Anonym => arguments.public = false,
            Self::Bars => arguments.bars = true,
            Self::NoBars => arguments.bars = false,
            Self::Votes => {
                arguments.max_votes = segment
                    .strip_prefix("votes=")
                    .and_then(|value| value.parse::<i64>().ok())
                    .filter(|value| *value > 0)
                    .map(|value| u32::try_from(value).unwrap_or(u32::MAX))
                    .unwrap_or(defaults.max_votes.max(1));
            }
            Self::Locale => {
                arguments.locale = segment
                    .strip_prefix("locale=")
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_owned);
            }
        }
    }
}

/// Parses the text typed after the slash command.
///
/// `Message --Option --Option --flag`: the first segment is the message, every
/// later segment is a flag when it matches a keyword exactly and an option
/// otherwise. Each keyword consumes its first match only; when a flag and its
/// negation both appear the later one wins.
pub fn parse_poll_command(text: &str, defaults: &PollDefaults) -> PollArguments {
    let mut segments = text.split(SEPARATOR).map(str::trim);
    let message = segments.next().unwrap_or_default().to_owned();
    let rest: Vec<&str> = segments.collect();

    let mut consumed: Vec<Option<Keyword>> = vec![None; rest.len()];
    for keyword in KEYWORDS {
        let position = rest
            .iter()
            .enumerate()
            .find(|(index, segment)| consumed[*index].is_none() && keyword.matches(segment));
        if let Some((index, _)) = position {
            consumed[index] = Some(keyword);
        }
    }

    let mut arguments = PollArguments {
        message,
        vote_options: Vec::new(),
        progress: defaults.progress,
        public: defaults.public,
        bars: defaults.bars,
        max_votes: defaults.max_votes.max(1),
        locale: None,
    };

    for (segment, keyword) in rest.iter().zip(consumed) {
        match keyword {
            Some(keyword) => keyword.apply(segment, &mut arguments, defaults),
            None => arguments.vote_options.push((*segment).to_owned()),
        }
    }

    arguments
}

/// True for exactly `help`; `help me` is an ordinary poll message.
pub fn is_help_request(text: &str) -> bool {
    text.trim() == "help"
}

#[cfg(test)]
mod tests {
    use pollbot_core::{PollDefaults, PollId};

    use super::{is_help_request, parse_poll_command, ActionPayload, PollArguments};

    fn parse(text: &str) -> PollArguments {
        parse_poll_command(text, &PollDefaults::default())
    }

    fn summary(arguments: &PollArguments) -> (&str, Vec<&str>, bool, bool, u32) {
        (
            arguments.message.as_str(),
            arguments.vote_options.iter().map(String::as_str).collect(),
            arguments.secret(),
            arguments.public,
            arguments.max_votes,
        )
    }

    #[test]
    fn empty_input_uses_defaults() {
        let arguments = parse("");

        assert_eq!(arguments.message, "");
        assert!(arguments.vote_options.is_empty());
        assert!(arguments.progress && !arguments.public && !arguments.bars);
        assert_eq!(arguments.max_votes, 1);
        assert_eq!(arguments.locale, None);
    }

    #[test]
    fn parses_reference_commands() {
        let cases: Vec<(&str, (&str, Vec<&str>, bool, bool, u32))> = vec![
            (
                "Some message --Option 1 --Second Option",
                ("Some message", vec!["Option 1", "Second Option"], false, false, 1),
            ),
            (
                "Some message --Foo --Spam --secret",
                ("Some message", vec!["Foo", "Spam"], true, false, 1),
            ),
            (
                "Some message --Foo --Spam --Secret",
                ("Some message", vec!["Foo", "Spam", "Secret"], false, false, 1),
            ),
            (
                "Some message --Foo --Spam --public",
                ("Some message", vec!["Foo", "Spam"], false, true, 1),
            ),
            (
                "Some message --Foo --Spam --Public",
                ("Some message", vec!["Foo", "Spam", "Public"], false, false, 1),
            ),
            (
                "# heading\nSome **markup**<br>:tada: --More ~~markup~~ --:tada: --Spam-!",
                (
                    "# heading\nSome **markup**<br>:tada:",
                    vec!["More ~~markup~~", ":tada:", "Spam-!"],
                    false,
                    false,
                    1,
                ),
            ),
            (
                "No whitespace--Foo--Bar--Spam--secret--public",
                ("No whitespace", vec!["Foo", "Bar", "Spam"], true, true, 1),
            ),
            (
                "   Trim  whitespace   --   Foo-- Spam  Spam  -- secret",
                ("Trim  whitespace", vec!["Foo", "Spam  Spam"], true, false, 1),
            ),
            (
                "Some message --Foo --Spam --secret --votes=3",
                ("Some message", vec!["Foo", "Spam"], true, false, 3),
            ),
            (
                "Some message --votes=-1 --Foo --Spam",
                ("Some message", vec!["Foo", "Spam"], false, false, 1),
            ),
            (
                "Some message --votes=0 --Foo --Spam",
                ("Some message", vec!["Foo", "Spam"], false, false, 1),
            ),
        ];

        for (command, expected) in cases {
            let arguments = parse(command);
            assert_eq!(summary(&arguments), expected, "command: {command:?}");
        }
    }

    #[test]
    fn unparsable_vote_counts_become_options() {
        let arguments = parse("Q --votes=many --A --votes --votes=2");

        assert_eq!(arguments.vote_options, vec!["votes=many", "A", "votes"]);
        assert_eq!(arguments.max_votes, 2);
    }

    #[test]
    fn only_the_first_occurrence_of_a_keyword_is_consumed() {
        let arguments = parse("Q --A --votes=2 --votes=3 --secret --secret");

        assert_eq!(arguments.vote_options, vec!["A", "votes=3", "secret"]);
        assert_eq!(arguments.max_votes, 2);
        assert!(arguments.secret());
    }

    #[test]
    fn later_flag_wins_over_earlier_negation() {
        assert!(!parse("Q --A --noprogress --progress").secret());
        assert!(parse("Q --A --progress --secret").secret());
        assert!(!parse("Q --public --anonym").public);
        assert!(parse("Q --anonym --public").public);
        assert!(!parse("Q --bars --nobars").bars);
    }

    #[test]
    fn negations_override_configured_defaults() {
        let defaults = PollDefaults {
            progress: false,
            public: true,
            bars: true,
            max_votes: 2,
            locale: "de".to_owned(),
        };

        let untouched = parse_poll_command("Q --A --B --C", &defaults);
        assert!(untouched.secret() && untouched.public && untouched.bars);
        assert_eq!(untouched.max_votes, 2);

        let negated = parse_poll_command("Q --A --progress --anonym --nobars --votes=0", &defaults);
        assert!(!negated.secret() && !negated.public && !negated.bars);
        assert_eq!(negated.max_votes, 2);
        assert_eq!(negated.vote_options, vec!["A"]);
    }

    #[test]
    fn locale_flag_without_value_is_unset() {
        assert_eq!(parse("Q --A --locale=de").locale.as_deref(), Some("de"));
        assert_eq!(parse("Q --A --locale=").locale, None);

        let bare = parse("Q --A --locale");
        assert_eq!(bare.locale, None);
        assert_eq!(bare.vote_options, vec!["A"]);
    }

    #[test]
    fn reparsing_canonical_output_is_stable() {
        let first = parse("Some message --Foo --Spam --secret --votes=3");
        let canonical = std::iter::once(first.message.clone())
            .chain(first.vote_options.iter().map(|option| format!("--{option}")))
            .collect::<Vec<_>>()
            .join(" ");

        let second = parse(&canonical);

        assert_eq!(second.message, first.message);
        assert_eq!(second.vote_options, first.vote_options);
    }

    #[test]
    fn help_requires_the_bare_keyword() {
        assert!(is_help_request("help"));
        assert!(is_help_request("  help "));
        assert!(!is_help_request("help me"));
        assert!(!is_help_request("Help"));
    }

    #[test]
    fn arguments_convert_into_a_new_poll() {
        let poll = parse("Lunch? --Pizza --Sushi --secret --bars --votes=2")
            .into_new_poll("user0", "de");

        assert_eq!(poll.creator_id, "user0");
        assert_eq!(poll.locale, "de");
        assert_eq!(poll.vote_options, vec!["Pizza", "Sushi"]);
        assert!(poll.secret && poll.bars && !poll.public);
        assert_eq!(poll.max_votes, 2);
    }

    #[test]
    fn action_payload_accepts_numeric_and_string_poll_ids() {
        let numeric: ActionPayload =
            serde_json::from_str(r#"{"user_id":"u","context":{"poll_id":5,"vote":1}}"#)
                .expect("numeric id");
        let text: ActionPayload =
            serde_json::from_str(r#"{"user_id":"u","team_id":"t","context":{"poll_id":"7"}}"#)
                .expect("string id");
        let garbage: ActionPayload =
            serde_json::from_str(r#"{"user_id":"u","context":{"poll_id":"invalid123"}}"#)
                .expect("garbage id");

        assert_eq!(numeric.context.poll_id.poll_id(), Some(PollId(5)));
        assert_eq!(numeric.context.vote, Some(1));
        assert_eq!(text.context.poll_id.poll_id(), Some(PollId(7)));
        assert_eq!(text.team_id.as_deref(), Some("t"));
        assert_eq!(garbage.context.poll_id.poll_id(), None);
    }
}
