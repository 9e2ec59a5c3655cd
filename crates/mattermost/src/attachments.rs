use serde::Serialize;

use pollbot_core::localization::{self, tr, tr_count, Text};
use pollbot_core::{Poll, PollError, PollId, PollStore};

use crate::api::UserDirectory;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    InChannel,
    Ephemeral,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<usize>,
    pub poll_id: PollId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Integration {
    pub url: String,
    pub context: ActionContext,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Action {
    pub name: String,
    pub integration: Integration,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Field {
    pub short: bool,
    pub title: String,
    pub value: String,
}

impl Field {
    fn long(value: impl Into<String>) -> Self {
        Self { short: false, title: String::new(), value: value.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    pub fields: Vec<Field>,
}

/// Message posted in the channel for a poll.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PollResponse {
    pub response_type: ResponseType,
    pub attachments: Vec<Attachment>,
}

/// Reply visible only to the user who issued the command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EphemeralResponse {
    pub response_type: ResponseType,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PostUpdate {
    pub props: PollResponse,
}

/// Answer to an interactive button press.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<PostUpdate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ephemeral_text: Option<String>,
}

impl ActionResponse {
    pub fn update(props: PollResponse) -> Self {
        Self { update: Some(PostUpdate { props }), ephemeral_text: None }
    }

    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self { update: None, ephemeral_text: Some(text.into()) }
    }

    pub fn with_ephemeral(mut self, text: impl Into<String>) -> Self {
        self.ephemeral_text = Some(text.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptionTally {
    pub label: String,
    pub count: u64,
    /// Resolved voter names; only filled for finished public polls.
    pub voters: Vec<String>,
}

/// Point-in-time snapshot of a poll with everything rendering needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollView {
    pub id: PollId,
    pub message: String,
    pub locale: String,
    pub options: Vec<OptionTally>,
    pub secret: bool,
    pub public: bool,
    pub bars: bool,
    pub max_votes: u32,
    pub finished: bool,
    pub voter_count: u64,
    pub total_votes: u64,
}

impl PollView {
    pub async fn collect<S: PollStore>(
        poll: &Poll<S>,
        directory: &dyn UserDirectory,
    ) -> Result<Self, PollError> {
        let finished = poll.is_finished().await?;
        let mut options = Vec::with_capacity(poll.vote_options().len());
        for (vote_id, label) in poll.vote_options().iter().enumerate() {
            let voters = if finished && poll.public() {
                directory.resolve_usernames(&poll.voters_for(vote_id).await?).await
            } else {
                Vec::new()
            };
            options.push(OptionTally {
                label: label.clone(),
                count: poll.count_for(vote_id).await?,
                voters,
            });
        }

        Ok(Self {
            id: poll.id(),
            message: poll.message().to_string(),
            locale: poll.locale().to_string(),
            options,
            secret: poll.secret(),
            public: poll.public(),
            bars: poll.bars(),
            max_votes: poll.max_votes(),
            finished,
            voter_count: poll.voter_count().await?,
            total_votes: poll.total_votes().await?,
        })
    }

    fn percentage(&self, count: u64) -> f64 {
        if self.total_votes == 0 {
            0.0
        } else {
            100.0 * count as f64 / self.total_votes as f64
        }
    }
}

/// Renders a poll for the channel. `base_url` is where this service is reachable,
/// without a trailing slash.
pub fn format_poll(view: &PollView, base_url: &str) -> PollResponse {
    let attachment = if view.finished {
        finished_attachment(view, base_url)
    } else {
        running_attachment(view, base_url)
    };
    PollResponse { response_type: ResponseType::InChannel, attachments: vec![attachment] }
}

fn running_attachment(view: &PollView, base_url: &str) -> Attachment {
    let voters = tr_count(&view.locale, Text::NumberOfVoters, view.voter_count);
    let mut fields = vec![Field::long(voters)];
    if view.public {
        fields.push(Field::long(tr(&view.locale, Text::PublicWarning)));
    }
    if view.max_votes > 1 {
        fields.push(Field::long(tr_count(
            &view.locale,
            Text::VotesAvailable,
            u64::from(view.max_votes),
        )));
    }

    Attachment { text: view.message.clone(), actions: format_actions(view, base_url), fields }
}

fn finished_attachment(view: &PollView, base_url: &str) -> Attachment {
    let mut options: Vec<&OptionTally> = view.options.iter().collect();
    if view.bars {
        // stable: ties keep their creation order
        options.sort_by(|left, right| right.count.cmp(&left.count));
    }

    let voters = tr_count(&view.locale, Text::NumberOfVoters, view.voter_count);
    let mut fields = vec![Field::long(voters)];
    fields.extend(options.into_iter().map(|option| Field {
        short: !view.bars,
        title: option.label.clone(),
        value: vote_end_text(view, option, base_url),
    }));

    Attachment { text: view.message.clone(), actions: Vec::new(), fields }
}

fn vote_end_text(view: &PollView, option: &OptionTally, base_url: &str) -> String {
    let percentage = view.percentage(option.count);
    let mut text = String::new();

    if view.bars {
        let bar_width = 450.0 * percentage / 100.0 + 2.0;
        text.push_str(&format!("![Bar]({base_url}/img/bar.png ={bar_width:.0}x25) "));
    }

    text.push_str(&format!(
        "{} ({percentage:.1}%)",
        localization::vote_count(&view.locale, option.count)
    ));

    if view.public && !option.voters.is_empty() {
        text.push('\n');
        text.push_str(&option.voters.join(", "));
    }

    text
}

/// One button per option plus the trailing end button.
pub fn format_actions(view: &PollView, base_url: &str) -> Vec<Action> {
    let vote_url = format!("{base_url}/vote");
    let mut actions: Vec<Action> = view
        .options
        .iter()
        .enumerate()
        .map(|(vote_id, option)| Action {
            name: if view.secret {
                option.label.clone()
            } else {
                format!("{} ({})", option.label, option.count)
            },
            integration: Integration {
                url: vote_url.clone(),
                context: ActionContext { vote: Some(vote_id), poll_id: view.id },
            },
        })
        .collect();

    actions.push(Action {
        name: tr(&view.locale, Text::EndPoll).to_string(),
        integration: Integration {
            url: format!("{base_url}/end"),
            context: ActionContext { vote: None, poll_id: view.id },
        },
    });
    actions
}

/// `Pizza ✓, Burger ✗, Extra Cheese ✓`
pub fn format_user_vote(options: &[String], held: &[usize]) -> String {
    options
        .iter()
        .enumerate()
        .map(|(vote_id, label)| {
            let mark = if held.contains(&vote_id) { '✓' } else { '✗' };
            format!("{label} {mark}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn vote_updated_text(locale: &str, options: &[String], held: &[usize]) -> String {
    format!("{}\n{}", tr(locale, Text::VoteUpdated), format_user_vote(options, held))
}

pub fn ephemeral(text: impl Into<String>) -> EphemeralResponse {
    EphemeralResponse { response_type: ResponseType::Ephemeral, text: text.into() }
}

pub fn format_help(command: &str, locale: &str) -> EphemeralResponse {
    ephemeral(localization::help(locale, command))
}

#[cfg(test)]
mod tests {
    use pollbot_core::PollId;
    use serde_json::json;

    use super::{
        ephemeral, format_actions, format_poll, format_user_vote, vote_updated_text,
        ActionResponse, OptionTally, PollView,
    };

    const BASE: &str = "http://localhost:5005";

    fn view(counts: &[(&str, u64)]) -> PollView {
        let total_votes = counts.iter().map(|(_, count)| count).sum();
        PollView {
            id: PollId(1),
            message: "Message".to_string(),
            locale: "en".to_string(),
            options: counts
                .iter()
                .map(|(label, count)| OptionTally {
                    label: label.to_string(),
                    count: *count,
                    voters: Vec::new(),
                })
                .collect(),
            secret: false,
            public: false,
            bars: false,
            max_votes: 1,
            finished: false,
            voter_count: total_votes,
            total_votes,
        }
    }

    #[test]
    fn running_poll_shows_counts_and_an_end_button() {
        let response = format_poll(&view(&[("Yes", 3), ("No", 2)]), BASE);
        let value = serde_json::to_value(&response).expect("serialize");

        assert_eq!(value["response_type"], "in_channel");
        let attachment = &value["attachments"][0];
        assert_eq!(attachment["text"], "Message");
        assert_eq!(attachment["actions"][0]["name"], "Yes (3)");
        assert_eq!(attachment["actions"][1]["name"], "No (2)");
        assert_eq!(
            attachment["actions"][0]["integration"],
            json!({"url": "http://localhost:5005/vote", "context": {"vote": 0, "poll_id": 1}})
        );
        assert_eq!(attachment["actions"][2]["name"], "End Poll");
        assert_eq!(
            attachment["actions"][2]["integration"],
            json!({"url": "http://localhost:5005/end", "context": {"poll_id": 1}})
        );
        assert_eq!(
            attachment["fields"],
            json!([{"short": false, "title": "", "value": "*Number of voters: 5*"}])
        );
    }

    #[test]
    fn secret_polls_hide_counts_on_buttons() {
        let mut poll = view(&[("Yes", 3), ("No", 2)]);
        poll.secret = true;

        let names: Vec<String> =
            format_actions(&poll, BASE).into_iter().map(|action| action.name).collect();

        assert_eq!(names, vec!["Yes", "No", "End Poll"]);
    }

    #[test]
    fn running_poll_fields_mention_public_mode_and_vote_budget() {
        let mut poll = view(&[("a", 0), ("b", 0), ("c", 0)]);
        poll.public = true;
        poll.max_votes = 2;

        let response = format_poll(&poll, BASE);
        let values: Vec<&str> =
            response.attachments[0].fields.iter().map(|field| field.value.as_str()).collect();

        assert_eq!(values.len(), 3);
        assert!(values[1].contains("This poll is public"));
        assert_eq!(values[2], "*You have 2 votes*");
    }

    #[test]
    fn finished_poll_lists_results_without_actions() {
        let mut poll = view(&[("Yes", 1), ("Maybe", 0), ("No", 2)]);
        poll.finished = true;

        let value = serde_json::to_value(format_poll(&poll, BASE)).expect("serialize");
        let attachment = &value["attachments"][0];

        assert!(attachment.get("actions").is_none());
        assert_eq!(
            attachment["fields"],
            json!([
                {"short": false, "title": "", "value": "*Number of voters: 3*"},
                {"short": true, "title": "Yes", "value": "1 Vote (33.3%)"},
                {"short": true, "title": "Maybe", "value": "0 Votes (0.0%)"},
                {"short": true, "title": "No", "value": "2 Votes (66.7%)"},
            ])
        );
    }

    #[test]
    fn finished_poll_without_votes_reports_zero_percent() {
        let mut poll = view(&[("Yes", 0), ("No", 0)]);
        poll.finished = true;

        let response = format_poll(&poll, BASE);

        assert_eq!(response.attachments[0].fields[1].value, "0 Votes (0.0%)");
    }

    #[test]
    fn bars_sort_by_count_and_embed_scaled_images() {
        let mut poll = view(&[("a", 1), ("b", 4), ("c", 0)]);
        poll.finished = true;
        poll.bars = true;

        let response = format_poll(&poll, BASE);
        let fields = &response.attachments[0].fields;

        let titles: Vec<&str> = fields[1..].iter().map(|field| field.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "a", "c"]);
        assert!(fields[1..].iter().all(|field| !field.short));
        assert_eq!(
            fields[1].value,
            "![Bar](http://localhost:5005/img/bar.png =362x25) 4 Votes (80.0%)"
        );
        assert_eq!(
            fields[2].value,
            "![Bar](http://localhost:5005/img/bar.png =92x25) 1 Vote (20.0%)"
        );
        assert_eq!(
            fields[3].value,
            "![Bar](http://localhost:5005/img/bar.png =2x25) 0 Votes (0.0%)"
        );
    }

    #[test]
    fn public_results_list_voter_names() {
        let mut poll = view(&[("a", 2), ("b", 0)]);
        poll.finished = true;
        poll.public = true;
        poll.options[0].voters = vec!["alice".to_string(), "bob".to_string()];

        let response = format_poll(&poll, BASE);

        assert_eq!(response.attachments[0].fields[1].value, "2 Votes (100.0%)\nalice, bob");
        assert_eq!(response.attachments[0].fields[2].value, "0 Votes (0.0%)");
    }

    #[test]
    fn german_polls_render_in_german() {
        let mut poll = view(&[("Ja", 1), ("Nein", 0)]);
        poll.locale = "de".to_string();

        let response = format_poll(&poll, BASE);
        let end = response.attachments[0].actions.last().map(|action| action.name.as_str());

        assert_eq!(end, Some("Umfrage beenden"));
        assert_eq!(response.attachments[0].fields[0].value, "*Anzahl der Teilnehmer: 1*");
    }

    #[test]
    fn user_vote_summary_marks_held_options() {
        let options = vec!["Pizza".to_string(), "Burger".to_string(), "Extra Cheese".to_string()];

        assert_eq!(format_user_vote(&options, &[0, 2]), "Pizza ✓, Burger ✗, Extra Cheese ✓");
        assert_eq!(
            vote_updated_text("en", &options, &[1]),
            "Your vote has been updated:\nPizza ✗, Burger ✓, Extra Cheese ✗"
        );
    }

    #[test]
    fn responses_serialize_in_the_platform_shape() {
        assert_eq!(
            serde_json::to_value(ephemeral("Please provide a message")).expect("serialize"),
            json!({"response_type": "ephemeral", "text": "Please provide a message"})
        );
        assert_eq!(
            serde_json::to_value(ActionResponse::ephemeral("nope")).expect("serialize"),
            json!({"ephemeral_text": "nope"})
        );
    }
}
