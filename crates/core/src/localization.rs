//! Message catalog for the languages polls can be rendered in.
//!
//! Templates carry `{count}` or `{command}` placeholders which `tr_count`,
//! `vote_count` and `help` substitute. Lookups never fail: unknown languages render in English.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Language {
    English,
    German,
}

impl Language {
    /// Resolves `de`, `de_DE` or `de-AT` to German; anything unrecognised is English.
    pub fn from_locale(locale: &str) -> Self {
        let primary = locale
            .trim()
            .split(['_', '-'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match primary.as_str() {
            "de" => Self::German,
            _ => Self::English,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::German => "de",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Text {
    Yes,
    No,
    EndPoll,
    NumberOfVoters,
    VotesAvailable,
    PublicWarning,
    VoteCountOne,
    VoteCountMany,
    VoteUpdated,
    NoVotesLeft,
    InvalidVote,
    NotAllowedToEnd,
    InvalidPoll,
    MissingMessage,
    InvalidToken,
    Help,
}

pub fn tr(locale: &str, text: Text) -> &'static str {
    match Language::from_locale(locale) {
        Language::English => english(text),
        Language::German => german(text),
    }
}

pub fn tr_count(locale: &str, text: Text, count: u64) -> String {
    tr(locale, text).replace("{count}", &count.to_string())
}

/// "1 Vote", "3 Votes".
pub fn vote_count(locale: &str, count: u64) -> String {
    let text = if count == 1 { Text::VoteCountOne } else { Text::VoteCountMany };
    tr_count(locale, text, count)
}

pub fn help(locale: &str, command: &str) -> String {
    tr(locale, Text::Help).replace("{command}", command)
}

fn english(text: Text) -> &'static str {
    match text {
        Text::Yes => "Yes",
        Text::No => "No",
        Text::EndPoll => "End Poll",
        Text::NumberOfVoters => "*Number of voters: {count}*",
        Text::VotesAvailable => "*You have {count} votes*",
        Text::PublicWarning => {
            ":warning: *This poll is public. When it closes the participants and their answers will be visible.*"
        }
        Text::VoteCountOne => "{count} Vote",
        Text::VoteCountMany => "{count} Votes",
        Text::VoteUpdated => "Your vote has been updated:",
        Text::NoVotesLeft => "You already used all your votes.\nClick on a vote to unselect it again.",
        Text::InvalidVote => "This option does not exist in the poll.",
        Text::NotAllowedToEnd => "You are not allowed to end this poll",
        Text::InvalidPoll => "This poll is not valid anymore.\nSorry for the inconvenience.",
        Text::MissingMessage => "Please provide a message",
        Text::InvalidToken => "The integration is not correctly set up: Invalid token.",
        Text::Help => ENGLISH_HELP,
    }
}

fn german(text: Text) -> &'static str {
    match text {
        Text::Yes => "Ja",
        Text::No => "Nein",
        Text::EndPoll => "Umfrage beenden",
        Text::NumberOfVoters => "*Anzahl der Teilnehmer: {count}*",
        Text::VotesAvailable => "*Sie haben {count} Stimmen*",
        Text::PublicWarning => {
            ":warning: *Diese Umfrage ist öffentlich. Nach dem Ende sind die Teilnehmer und ihre Antworten sichtbar.*"
        }
        Text::VoteCountOne => "{count} Stimme",
        Text::VoteCountMany => "{count} Stimmen",
        Text::VoteUpdated => "Ihre Wahl wurde aktualisiert:",
        Text::NoVotesLeft => {
            "Sie haben bereits alle Stimmen vergeben.\nKlicken Sie auf eine Stimme, um sie wieder abzuwählen."
        }
        Text::InvalidVote => "Diese Option gibt es in der Umfrage nicht.",
        Text::NotAllowedToEnd => "Sie dürfen diese Umfrage nicht beenden",
        Text::InvalidPoll => "Diese Umfrage ist nicht mehr gültig.\nEntschuldigung.",
        Text::MissingMessage => "Bitte geben Sie eine Nachricht an",
        Text::InvalidToken => "Die Integration ist nicht korrekt eingerichtet: Ungültiges Token.",
        Text::Help => GERMAN_HELP,
    }
}

const ENGLISH_HELP: &str = "\
#### Create a poll
`{command} <Message> --<Option 1> --<Option 2> ...`

Without options the poll offers *Yes* and *No*.

#### Settings
- `--secret` or `--noprogress`: hide the vote counts until the poll ends
- `--progress`: show the vote counts while the poll runs
- `--public`: show who voted for what when the poll ends
- `--anonym`: keep the voters hidden
- `--bars`: show the results as a bar chart
- `--nobars`: show the results as plain numbers
- `--votes=<N>`: allow every user to pick up to N options
- `--locale=<language>`: render the poll in this language (`en`, `de`)

Only the creator of a poll or an administrator can end it.

Example: `{command} Where do we go for lunch? --Pizza --Sushi --votes=2`";

const GERMAN_HELP: &str = "\
#### Eine Umfrage erstellen
`{command} <Nachricht> --<Option 1> --<Option 2> ...`

Ohne Optionen bietet die Umfrage *Ja* und *Nein* an.

#### Einstellungen
- `--secret` oder `--noprogress`: Stimmen bis zum Ende der Umfrage verbergen
- `--progress`: Stimmen während der Umfrage anzeigen
- `--public`: nach dem Ende anzeigen, wer wofür gestimmt hat
- `--anonym`: Teilnehmer nicht anzeigen
- `--bars`: Ergebnis als Balkendiagramm anzeigen
- `--nobars`: Ergebnis als Zahlen anzeigen
- `--votes=<N>`: jeder darf bis zu N Optionen wählen
- `--locale=<Sprache>`: Umfrage in dieser Sprache anzeigen (`en`, `de`)

Nur der Ersteller einer Umfrage oder ein Administrator kann sie beenden.

Beispiel: `{command} Wo gehen wir essen? --Pizza --Sushi --votes=2`";
