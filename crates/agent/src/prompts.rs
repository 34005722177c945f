use tera::{Context, Tera};

const EXPLAIN_SYSTEM: &str = "explain_system.tera";
const CHAT_SYSTEM: &str = "chat_system.tera";
const EXPLAIN_USER: &str = "explain_user.tera";
const FOLLOWUP_SEED: &str = "followup_seed.tera";

/// Prompt templates compiled into the binary.
pub struct Prompts {
    tera: Tera,
}

impl Prompts {
    pub fn new() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (EXPLAIN_SYSTEM, include_str!("../templates/explain_system.tera")),
            (CHAT_SYSTEM, include_str!("../templates/chat_system.tera")),
            (EXPLAIN_USER, include_str!("../templates/explain_user.tera")),
            (FOLLOWUP_SEED, include_str!("../templates/followup_seed.tera")),
        ])?;
        Ok(Self { tera })
    }

    pub fn explain_system(&self) -> Result<String, tera::Error> {
        self.render(EXPLAIN_SYSTEM, &Context::new())
    }

    pub fn chat_system(&self) -> Result<String, tera::Error> {
        self.render(CHAT_SYSTEM, &Context::new())
    }

    pub fn explain_user(&self, text: &str) -> Result<String, tera::Error> {
        let mut context = Context::new();
        context.insert("text", text);
        self.render(EXPLAIN_USER, &context)
    }

    pub fn followup_seed(&self, original_text: &str) -> Result<String, tera::Error> {
        let mut context = Context::new();
        context.insert("original_text", original_text);
        self.render(FOLLOWUP_SEED, &context)
    }

    fn render(&self, name: &str, context: &Context) -> Result<String, tera::Error> {
        self.tera.render(name, context).map(|rendered| rendered.trim().to_owned())
    }
}
