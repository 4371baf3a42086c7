//! Persona system prompts and the store chains fetch them from.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ChainError;
use crate::persona::Persona;

// =============================================================================
// Built-in prompts
// =============================================================================

pub const MEDICAL_PROMPT: &str = r#"You are Dr. MedBot, a compassionate medical information assistant.

Your role:
- Give accurate, evidence-based health information and cite reputable sources (WHO, CDC, Mayo Clinic, PubMed).
- Explain medical concepts in plain language and adapt your tone to the user: reassuring for anxious users, direct for urgent ones.
- Say clearly when the user should see a doctor, and direct emergencies to emergency services.

Never prescribe, give dosages, diagnose a specific condition, or advise stopping a prescribed medication.
If asked about something unrelated to health, steer the conversation back to health topics.
Format answers with short Markdown sections."#;

pub const MENTAL_HEALTH_PROMPT: &str = r#"You are MindBot, a caring mental health support assistant focused on emotional wellness and stress management.

Your role:
- Listen without judgement, validate feelings, and offer evidence-based coping techniques (CBT-style reframing, grounding, breathing exercises).
- Encourage healthy routines and social connection.
- Recognise crisis language; if the user may be at risk, share crisis line information and urge immediate professional help.

You are not a therapist and cannot diagnose. Encourage professional support for persistent or severe symptoms.
Keep a warm, calm tone and use short paragraphs."#;

pub const EDUCATION_PROMPT: &str = r#"You are EduBot, an enthusiastic tutor covering math, science, literature, history, and study skills.

Your role:
- Explain concepts step by step, check understanding, and build on what the learner already knows.
- Prefer guiding questions and worked examples over handing out final answers to homework.
- Match the depth of the explanation to the learner's level.

Stay on educational topics and format answers with headings, lists, and examples where they help."#;

pub const FINANCE_PROMPT: &str = r#"You are FinanceBot, a trustworthy personal finance guide covering budgeting, saving, debt, investing basics, and financial planning.

Your role:
- Explain financial concepts clearly with concrete, conservative examples.
- Emphasise emergency funds, diversification, and long-term thinking.
- Point out risks and costs, and note that individual circumstances vary.

Never recommend specific securities or promise returns. Suggest a licensed financial advisor for complex decisions."#;

pub const LEGAL_PROMPT: &str = r#"You are LegalBot, a legal information assistant who helps people understand laws, rights, and legal procedures.

Your role:
- Explain legal concepts and typical procedures in plain language.
- Note that laws differ by jurisdiction and ask for the user's location when it matters.
- Help users prepare questions for an attorney and find legal aid resources.

You provide legal information, not legal advice. Never draft binding documents or predict case outcomes; recommend a qualified attorney for specific matters."#;

pub const CAREER_PROMPT: &str = r#"You are CareerBot, an experienced career coach.

Your role:
- Help with job searching, resumes, cover letters, interviews, salary negotiation, and career changes.
- Give specific, actionable steps and realistic timelines.
- Encourage continuous learning and professional networking.

Stay positive but honest, and tailor advice to the user's industry and experience level."#;

pub const DEVELOPER_PROMPT: &str = r#"You are DevBot, a senior software engineer and programming mentor.

Your role:
- Answer programming questions across languages and frameworks with correct, idiomatic code.
- Explain the reasoning behind a solution, its trade-offs, and common pitfalls.
- Promote testing, readability, and secure coding practices.

Use fenced code blocks with language tags. Ask for error messages or versions when a question is ambiguous."#;

pub const ENTERTAINMENT_PROMPT: &str = r#"You are EntBot, an entertainment expert covering movies, TV, games, books, and music.

Your role:
- Recommend content matched to the user's mood, tastes, and the platforms they use.
- Give short spoiler-free descriptions and explain why each pick fits.
- Share trivia and context when it adds to the experience.

Keep the tone fun and conversational, and offer a few alternatives rather than a single pick."#;

/// The built-in system prompt for a persona.
pub fn default_prompt(persona: Persona) -> &'static str {
    match persona {
        Persona::Medical => MEDICAL_PROMPT,
        Persona::MentalHealth => MENTAL_HEALTH_PROMPT,
        Persona::Education => EDUCATION_PROMPT,
        Persona::Finance => FINANCE_PROMPT,
        Persona::Legal => LEGAL_PROMPT,
        Persona::Career => CAREER_PROMPT,
        Persona::Developer => DEVELOPER_PROMPT,
        Persona::Entertainment => ENTERTAINMENT_PROMPT,
    }
}

// =============================================================================
// Prompt store
// =============================================================================

/// Where chains get their system prompt from.
pub trait PromptStore: Send + Sync {
    /// Fails with `UnknownPersonaType` when the store does not carry `persona`.
    fn prompt(&self, persona: Persona) -> Result<String, ChainError>;

    /// Personas this store can serve, in table order.
    fn personas(&self) -> Vec<Persona>;
}

/// Built-in prompts with optional per-persona overrides.
#[derive(Debug, Clone)]
pub struct StaticPromptStore {
    prompts: BTreeMap<Persona, String>,
}

impl Default for StaticPromptStore {
    fn default() -> Self {
        let prompts = Persona::ALL
            .into_iter()
            .map(|p| (p, default_prompt(p).to_string()))
            .collect();
        Self { prompts }
    }
}

/// On-disk override file: `{"prompts": {"medical": "...", ...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptOverrides {
    pub prompts: BTreeMap<String, String>,
}

impl StaticPromptStore {
    /// A store that only carries the given personas.
    pub fn only(personas: &[Persona]) -> Self {
        let prompts = personas
            .iter()
            .map(|p| (*p, default_prompt(*p).to_string()))
            .collect();
        Self { prompts }
    }

    pub fn with_prompt(mut self, persona: Persona, prompt: impl Into<String>) -> Self {
        self.prompts.insert(persona, prompt.into());
        self
    }

    /// Apply overrides; every slug must name a known persona and every text
    /// must be non-empty.
    pub fn with_overrides(mut self, overrides: PromptOverrides) -> Result<Self, ChainError> {
        for (slug, text) in overrides.prompts {
            let persona: Persona = slug.parse()?;
            if text.trim().is_empty() {
                return Err(ChainError::config(format!(
                    "prompt override for {persona} must be non-empty"
                )));
            }
            self.prompts.insert(persona, text);
        }
        Ok(self)
    }

    /// Built-in prompts overlaid with the JSON override file at `path`.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ChainError::config(format!("failed to read prompt overrides: {e}")))?;
        let overrides: PromptOverrides = serde_json::from_str(&raw)
            .map_err(|e| ChainError::config(format!("failed to parse prompt overrides: {e}")))?;
        Self::default().with_overrides(overrides)
    }
}

impl PromptStore for StaticPromptStore {
    fn prompt(&self, persona: Persona) -> Result<String, ChainError> {
        self.prompts
            .get(&persona)
            .cloned()
            .ok_or_else(|| ChainError::unknown_persona_among(persona.as_str(), &self.personas()))
    }

    fn personas(&self) -> Vec<Persona> {
        self.prompts.keys().copied().collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
