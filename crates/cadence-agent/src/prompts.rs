//! Prompt assembly

use crate::store::{FactRecord, SessionRecord};

/// Number of earlier sessions whose summaries are included
pub const RECENT_SESSION_LIMIT: usize = 3;

/// Maximum number of stored facts included
pub const FACT_LIMIT: usize = 20;

/// Pause marker the model is told to use; the client turns it into silence
pub const PAUSE_TOKEN: &str = "<PAUSE>";

const COACH_PROMPT: &str = r#"You are Alex, a thoughtful career coach. You help people think clearly about their work and where it is going. Everything you write is read aloud.

## Style
- Keep replies short and natural, usually one to three sentences.
- Prefer questions to advice, but answer plainly when asked something directly.
- One idea at a time.
- Sound like a person, not a template.

## Pacing
Write <PAUSE> where a speaker would naturally stop for a beat:
- Before a question that matters: "That's interesting. <PAUSE> What's driving that?"
- After something heavy: "That sounds hard. <PAUSE> Tell me more."
- When changing direction: "Okay. <PAUSE> Let's look at it another way."
Use it sparingly.

## Adapting
- Direct question: short direct answer.
- Venting: reflect and empathise before probing.
- Stuck: offer a reframe.
- Excited: match the energy briefly.

## Avoid
- Monologues and lectures
- Several questions in one reply
- Lists, bullet points and markdown such as *bold* or _italic_
- Unsolicited advice

You are a thinking partner, not a questionnaire."#;

const TOOLS_PROMPT: &str = r#"

## Tools
Use these when they fit. Never announce a tool or ask permission first.

### complete_session
Call when the person says goodbye, thanks you and signs off, or the conversation has clearly wrapped up. Give a warm, brief goodbye with any key takeaway first, then call the tool.

### start_presentation_practice
Call when the person wants to rehearse a pitch, talk, interview answer or any spoken delivery. Explain briefly that they will record themselves and get detailed feedback, then call the tool with a short title. Afterwards, talk the feedback through with them.

### write_scratchpad / edit_scratchpad
The scratchpad is a markdown panel beside the chat. Use it when visual structure helps: SWOT tables, pros and cons, projections, action items, comparisons, timelines.
Use write_scratchpad only to create it. Once it exists, always update it with edit_scratchpad so changes stay incremental."#;

/// The fixed coaching prompt including tool guidance
pub fn coach_prompt() -> String {
    format!("{}{}", COACH_PROMPT, TOOLS_PROMPT)
}

/// Section describing earlier sessions; empty when none have a summary
pub fn build_context_prompt(sessions: &[SessionRecord]) -> String {
    let summaries: Vec<String> = sessions
        .iter()
        .filter_map(|s| {
            s.summary.as_ref().map(|summary| {
                format!(
                    "- Session on {}: {}",
                    s.started_at.format("%Y-%m-%d"),
                    summary
                )
            })
        })
        .collect();

    if summaries.is_empty() {
        return String::new();
    }

    format!(
        "\n\n## Previous Session Context\nRecent sessions covered:\n{}\n\nDraw on this when it is relevant; don't force it.",
        summaries.join("\n")
    )
}

/// Section listing stored facts; empty when there are none
pub fn build_facts_prompt(facts: &[FactRecord]) -> String {
    if facts.is_empty() {
        return String::new();
    }

    let list = facts
        .iter()
        .map(|f| format!("- {}", f.content))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "\n\n## What You Know About This Person\nFrom earlier conversations:\n{}\n\nUse this naturally without pointing out where you learned it.",
        list
    )
}

/// Full system prompt for a turn
pub fn build_system_prompt(sessions: &[SessionRecord], facts: &[FactRecord]) -> String {
    let mut prompt = coach_prompt();
    prompt.push_str(&build_context_prompt(sessions));
    prompt.push_str(&build_facts_prompt(facts));
    prompt
}

/// Prompt asking the model to summarise a finished session as JSON
pub fn extraction_prompt(transcript: &str) -> String {
    format!(
        r#"You are reviewing a finished coaching conversation. Produce:

1. A short title (3-6 words) naming the main topic.
2. Up to 5 facts about the person worth remembering next time, one sentence each: goals, current situation, skills and values, decisions made, important context.
3. A summary with 2-4 key insights, 2-4 concrete next steps and 2-3 reading or research suggestions.

Reply with JSON only, in exactly this shape:
{{
  "title": "Short Title",
  "facts": ["A fact about the person."],
  "summary": {{
    "insights": ["An insight"],
    "nextSteps": ["An action"],
    "reading": [{{"topic": "Topic", "description": "Why it is relevant"}}]
  }}
}}

Include fewer items if the conversation was brief.

CONVERSATION:
{}"#,
        transcript
    )
}
