use eli5_core::conversation::{preview, truncate_chars, ModalMetadata, Role};
use rand::seq::SliceRandom;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::events::{
    CHAT_ABOUT_THIS_ACTION, FOLLOWUP_ACTION_ID, FOLLOWUP_BLOCK_ID, FOLLOWUP_CALLBACK,
};

pub const MODAL_TITLE: &str = "ELI5 at your service";
pub const MAX_SECTION_CHARS: usize = 2900;
/// Longest follow-up question the modal input accepts.
pub const MAX_QUESTION_CHARS: usize = 2000;
const MIN_SECTION_BREAK: usize = 100;

const LOADING_MESSAGES: &[&str] = &[
    ":robot_face: Beep boop bop... translating the tech speak...",
    ":robot_face: Beep boop... consulting my jargon-to-English dictionary...",
    ":robot_face: Boop beep bop... decoding the tech speak...",
    ":robot_face: Beep boop... did you know the first computer bug was an actual moth? Anyway, thinking...",
    ":robot_face: Boop boop beep... fun fact: 'HTTP' stands for HyperText Transfer Protocol. Now let me explain the rest...",
    ":robot_face: Beep bop... fun fact: the first 1GB hard drive weighed 550 pounds. Translating your message...",
    ":robot_face: Beep boop bop... crunching the jargon into bite-sized pieces...",
    ":robot_face: Boop beep... warming up my explain-o-tron 3000...",
];

static SECTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*(?:TLDR|Technical Terms|Abbreviations|Here's What It Means)\*")
        .expect("valid section header regex")
});

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Plain { text } | Self::Mrkdwn { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "button")]
pub struct ButtonElement {
    pub action_id: String,
    pub text: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ButtonElement {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            text: TextObject::plain(label),
            style: None,
            value: None,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "plain_text_input")]
pub struct PlainTextInput {
    pub action_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<TextObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section {
        #[serde(skip_serializing_if = "Option::is_none")]
        block_id: Option<String>,
        text: TextObject,
    },
    Divider {},
    Header {
        text: TextObject,
    },
    Actions {
        #[serde(skip_serializing_if = "Option::is_none")]
        block_id: Option<String>,
        elements: Vec<ButtonElement>,
    },
    Context {
        elements: Vec<TextObject>,
    },
    Input {
        block_id: String,
        optional: bool,
        label: TextObject,
        element: PlainTextInput,
    },
}

impl Block {
    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Section { block_id: None, text: TextObject::mrkdwn(text) }
    }

    pub fn divider() -> Self {
        Self::Divider {}
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: None, text: builder.build() });
        self
    }

    pub fn header(mut self, text: impl Into<String>) -> Self {
        self.blocks.push(Block::Header { text: TextObject::plain(text) });
        self
    }

    pub fn divider(mut self) -> Self {
        self.blocks.push(Block::divider());
        self
    }

    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        self.blocks
            .push(Block::Actions { block_id: Some(block_id.into()), elements: builder.build() });
        self
    }

    pub fn input(mut self, block_id: impl Into<String>, input: InputBuilder) -> Self {
        self.blocks.push(input.build(block_id.into()));
        self
    }

    pub fn extend(mut self, blocks: impl IntoIterator<Item = Block>) -> Self {
        self.blocks.extend(blocks);
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ButtonElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(button);
        self
    }

    fn build(self) -> Vec<ButtonElement> {
        self.elements
    }
}

pub struct InputBuilder {
    action_id: String,
    label: String,
    placeholder: Option<String>,
    max_length: Option<usize>,
    optional: bool,
}

impl InputBuilder {
    pub fn plain_text(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            label: label.into(),
            placeholder: None,
            max_length: None,
            optional: false,
        }
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    fn build(self, block_id: String) -> Block {
        Block::Input {
            block_id,
            optional: self.optional,
            label: TextObject::plain(self.label),
            element: PlainTextInput {
                action_id: self.action_id,
                placeholder: self.placeholder.map(TextObject::plain),
                max_length: self.max_length,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Modal,
    Home,
}

/// A modal or App Home surface, serialized the way `views.*` expects it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct View {
    #[serde(rename = "type")]
    pub kind: ViewKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub notify_on_close: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<TextObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit: Option<TextObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close: Option<TextObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_metadata: Option<String>,
    pub blocks: Vec<Block>,
}

impl View {
    pub fn modal(blocks: Vec<Block>) -> Self {
        Self {
            kind: ViewKind::Modal,
            callback_id: None,
            notify_on_close: false,
            title: Some(TextObject::plain(MODAL_TITLE)),
            submit: None,
            close: Some(TextObject::plain("Close")),
            private_metadata: None,
            blocks,
        }
    }

    pub fn home(blocks: Vec<Block>) -> Self {
        Self {
            kind: ViewKind::Home,
            callback_id: None,
            notify_on_close: false,
            title: None,
            submit: None,
            close: None,
            private_metadata: None,
            blocks,
        }
    }
}

/// Splits an explanation into section blocks at its bold headers, keeping
/// every section under Slack's per-block text limit.
pub fn split_explanation_blocks(explanation: &str) -> Vec<Block> {
    let mut starts: Vec<usize> =
        SECTION_HEADER.find_iter(explanation).map(|found| found.start()).collect();
    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }
    starts.push(explanation.len());

    let mut blocks = Vec::new();
    for bounds in starts.windows(2) {
        let mut section = explanation[bounds[0]..bounds[1]].trim();
        while section.chars().count() > MAX_SECTION_CHARS {
            let limit = byte_offset(section, MAX_SECTION_CHARS);
            let cut = match section[..limit].rfind('\n') {
                Some(newline) if section[..newline].chars().count() >= MIN_SECTION_BREAK => newline,
                _ => limit,
            };
            blocks.push(Block::mrkdwn(&section[..cut]));
            section = section[cut..].trim();
        }
        if !section.is_empty() {
            blocks.push(Block::mrkdwn(section));
        }
    }
    blocks
}

fn byte_offset(text: &str, chars: usize) -> usize {
    text.char_indices().nth(chars).map(|(index, _)| index).unwrap_or(text.len())
}

fn original_message_blocks(original_text: &str) -> Vec<Block> {
    vec![
        Block::mrkdwn(format!("*Original message:*\n>{}", preview(original_text))),
        Block::divider(),
    ]
}

pub fn explanation_blocks(original_text: &str, explanation: &str) -> Vec<Block> {
    let mut blocks = original_message_blocks(original_text);
    blocks.extend(split_explanation_blocks(explanation));
    blocks
}

/// Message posted in a thread by the public shortcut.
pub fn explanation_message(original_text: &str, explanation: &str) -> MessageTemplate {
    MessageBuilder::new(explanation).extend(explanation_blocks(original_text, explanation)).build()
}

pub fn loading_modal() -> View {
    let line = LOADING_MESSAGES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(":robot_face: Beep boop... thinking...");
    View::modal(vec![Block::mrkdwn(line)])
}

pub fn notice_modal(text: &str) -> View {
    View::modal(vec![Block::mrkdwn(text)])
}

fn question_block(question: &str) -> Block {
    let question = question.trim();
    let shown = truncate_chars(question, MAX_QUESTION_CHARS);
    if shown.len() < question.len() {
        Block::mrkdwn(format!("*You asked:* {shown}..."))
    } else {
        Block::mrkdwn(format!("*You asked:* {shown}"))
    }
}

fn conversation_blocks(metadata: &ModalMetadata) -> Vec<Block> {
    let mut blocks = Vec::new();
    for turn in &metadata.conversation {
        match turn.role {
            Role::User => {
                blocks.push(Block::divider());
                blocks.push(question_block(&turn.content));
            }
            Role::Assistant => blocks.extend(split_explanation_blocks(&turn.content)),
        }
    }
    blocks
}

/// The explanation modal with its Q&A history and the follow-up input.
pub fn explanation_modal(metadata: &ModalMetadata) -> View {
    let template = MessageBuilder::new(metadata.explanation.clone())
        .extend(explanation_blocks(&metadata.original_text, &metadata.explanation))
        .extend(conversation_blocks(metadata))
        .divider()
        .actions("chat_actions", |actions| {
            actions.button(
                ButtonElement::new(CHAT_ABOUT_THIS_ACTION, "Chat about this")
                    .style(ButtonStyle::Primary)
                    .value("chat"),
            );
        })
        .input(
            FOLLOWUP_BLOCK_ID,
            InputBuilder::plain_text(FOLLOWUP_ACTION_ID, "Want to dig deeper?")
                .placeholder("Ask a follow-up question...")
                .max_length(MAX_QUESTION_CHARS)
                .optional(),
        )
        .build();

    View {
        callback_id: Some(FOLLOWUP_CALLBACK.to_owned()),
        notify_on_close: true,
        submit: Some(TextObject::plain("Ask")),
        close: Some(TextObject::plain("Done")),
        private_metadata: Some(metadata.encode()),
        ..View::modal(template.blocks)
    }
}

/// Shown inline while a follow-up question is being answered.
pub fn thinking_modal(metadata: &ModalMetadata, question: &str) -> View {
    let template = MessageBuilder::new(question)
        .extend(explanation_blocks(&metadata.original_text, &metadata.explanation))
        .extend(conversation_blocks(metadata))
        .divider()
        .extend([question_block(question)])
        .section(|section| {
            section.mrkdwn(":hourglass_flowing_sand: Thinking...");
        })
        .build();

    View {
        callback_id: Some(FOLLOWUP_CALLBACK.to_owned()),
        notify_on_close: true,
        close: Some(TextObject::plain("Done")),
        private_metadata: Some(metadata.encode()),
        ..View::modal(template.blocks)
    }
}

pub fn home_view() -> View {
    let template = MessageBuilder::new("ELI5 home")
        .header(MODAL_TITLE)
        .section(|section| {
            section.mrkdwn(
                "I help you understand technical terms, acronyms, and complex concepts in simple language.",
            );
        })
        .divider()
        .section(|section| {
            section.mrkdwn(
                "*How to use:*\n1. Find a message with confusing technical terms\n2. Click the *three dots menu* (more actions) on the message\n3. Choose *ELI5* to get an explanation\nI can also read images and links in messages!",
            );
        })
        .divider()
        .section(|section| {
            section.mrkdwn(
                "*Want to chat about it?*\n• Click the *Chat about this* button in the explanation\n• React to any message with :eli5: or :speech_balloon:\n• Or just DM me directly! Paste a Slack message link and I'll explain it",
            );
        })
        .build();

    View::home(template.blocks)
}

/// How a DM conversation about a message got started.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DmOrigin {
    Reaction,
    ChatButton,
}

pub fn dm_intro_text(origin: DmOrigin, original_text: &str) -> String {
    let opener = match origin {
        DmOrigin::Reaction => "Hey! I saw you wanted to chat about this message:",
        DmOrigin::ChatButton => "Hey! You wanted to chat about this message:",
    };
    format!(
        "{opener}\n\n>{}\n\nWhat would you like me to explain? Ask me anything!",
        preview(original_text)
    )
}

pub fn linked_message_reply(linked_text: &str, explanation: &str) -> String {
    format!(
        "Here's that message:\n>{}\n\n{explanation}\n\nFeel free to ask me follow-up questions!",
        preview(linked_text)
    )
}

#[cfg(test)]
mod tests {
    use eli5_core::conversation::{ConversationTurn, ModalMetadata};

    use super::{
        dm_intro_text, explanation_message, explanation_modal, home_view, loading_modal,
        split_explanation_blocks, thinking_modal, Block, DmOrigin, TextObject, ViewKind,
        MAX_QUESTION_CHARS, MAX_SECTION_CHARS,
    };

    fn section_texts(blocks: &[Block]) -> Vec<String> {
        blocks
            .iter()
            .filter_map(|block| match block {
                Block::Section { text, .. } => Some(text.text().to_owned()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn splits_on_each_known_header() {
        let explanation = "*TLDR*\nPages rebuild later.\n\n*Here's What It Means*\nStuff.\n\n*Technical Terms*\n- ISR: lazy rebuilds\n\n*Abbreviations*\n- ISR: Incremental Static Regeneration";

        let texts = section_texts(&split_explanation_blocks(explanation));

        assert_eq!(texts.len(), 4);
        assert!(texts[0].starts_with("*TLDR*"));
        assert!(texts[1].starts_with("*Here's What It Means*"));
        assert!(texts[3].starts_with("*Abbreviations*"));
    }

    #[test]
    fn long_questions_stay_within_section_limit() {
        let question = "why ".repeat(1_250);
        let metadata = ModalMetadata {
            original_text: "GC pause".to_owned(),
            explanation: "*TLDR*\nThe app froze.".to_owned(),
            conversation: vec![
                ConversationTurn::user(question.clone()),
                ConversationTurn::assistant("Because of garbage collection."),
            ],
        };

        for view in [explanation_modal(&metadata), thinking_modal(&metadata, &question)] {
            let texts = section_texts(&view.blocks);
            assert!(texts.iter().any(|text| text.starts_with("*You asked:* why")));
            assert!(texts.iter().all(|text| text.chars().count() <= 3000));
        }

        let json = serde_json::to_value(explanation_modal(&metadata)).expect("view json");
        let input = json["blocks"]
            .as_array()
            .and_then(|blocks| blocks.iter().find(|block| block["type"] == "input"))
            .expect("input block");
        assert_eq!(input["element"]["max_length"], MAX_QUESTION_CHARS);
    }

    #[test]
    fn keeps_preamble_before_first_header() {
        let texts = section_texts(&split_explanation_blocks("Sure!\n*TLDR*\nShort."));
        assert_eq!(texts, vec!["Sure!".to_owned(), "*TLDR*\nShort.".to_owned()]);
    }

    #[test]
    fn long_section_breaks_at_last_newline() {
        let line = format!("{}\n", "x".repeat(99));
        let explanation = format!("*TLDR*\n{}", line.repeat(40));

        let texts = section_texts(&split_explanation_blocks(&explanation));

        assert!(texts.len() >= 2);
        assert!(texts.iter().all(|text| text.chars().count() <= MAX_SECTION_CHARS));
        assert!(texts[0].ends_with('x'));
    }

    #[test]
    fn long_section_without_early_newline_is_hard_cut() {
        let explanation = format!("ab\n{}", "y".repeat(6_000));

        let texts = section_texts(&split_explanation_blocks(&explanation));

        assert_eq!(texts.len(), 3);
        assert_eq!(texts[0].chars().count(), MAX_SECTION_CHARS);
    }

    #[test]
    fn explanation_message_quotes_preview_then_divider() {
        let message = explanation_message(&"z".repeat(700), "*TLDR*\nHi");

        let Block::Section { text, .. } = &message.blocks[0] else {
            panic!("expected original message section");
        };
        assert!(text.text().starts_with("*Original message:*\n>"));
        assert!(text.text().ends_with("..."));
        assert_eq!(message.blocks[1], Block::divider());
        assert_eq!(message.fallback_text, "*TLDR*\nHi");
    }

    #[test]
    fn explanation_modal_serializes_followup_contract() {
        let metadata = ModalMetadata::new(
            "We use ISR",
            "*TLDR*\nPages refresh.",
            vec![ConversationTurn::user("why?"), ConversationTurn::assistant("Speed.")],
        );

        let json = serde_json::to_value(explanation_modal(&metadata)).expect("serialize");

        assert_eq!(json["type"], "modal");
        assert_eq!(json["callback_id"], "eli5_followup");
        assert_eq!(json["notify_on_close"], true);
        assert_eq!(json["submit"]["text"], "Ask");
        assert_eq!(json["close"]["text"], "Done");
        assert_eq!(json["title"]["type"], "plain_text");
        let blocks = json["blocks"].as_array().expect("blocks");
        let input = blocks.last().expect("input block");
        assert_eq!(input["type"], "input");
        assert_eq!(input["block_id"], "followup_block");
        assert_eq!(input["element"]["type"], "plain_text_input");
        assert_eq!(input["element"]["action_id"], "followup_input");
        assert!(blocks.iter().any(|block| block["text"]["text"] == "*You asked:* why?"));
        assert!(blocks.iter().any(|block| block["elements"][0]["action_id"] == "chat_about_this"
            && block["elements"][0]["type"] == "button"));
        let stored = json["private_metadata"].as_str().expect("metadata");
        assert_eq!(ModalMetadata::decode(stored), metadata);
    }

    #[test]
    fn loading_modal_has_single_robot_line() {
        let view = loading_modal();
        assert_eq!(view.kind, ViewKind::Modal);
        assert_eq!(view.blocks.len(), 1);
        let Block::Section { text: TextObject::Mrkdwn { text }, .. } = &view.blocks[0] else {
            panic!("expected mrkdwn section");
        };
        assert!(text.starts_with(":robot_face:"));
    }

    #[test]
    fn home_view_starts_with_header() {
        let json = serde_json::to_value(home_view()).expect("serialize");
        assert_eq!(json["type"], "home");
        assert_eq!(json["blocks"][0]["type"], "header");
        assert!(json.get("title").is_none());
    }

    #[test]
    fn dm_intro_mentions_origin_and_preview() {
        let text = dm_intro_text(DmOrigin::Reaction, "p99 is up");
        assert!(text.starts_with("Hey! I saw you wanted to chat"));
        assert!(text.contains(">p99 is up"));
        assert!(dm_intro_text(DmOrigin::ChatButton, "x").starts_with("Hey! You wanted"));
    }
}
