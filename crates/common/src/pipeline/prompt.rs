//! Prompt construction - renders the chat prompt handed to the model
//!
//! Provides:
//! - Pairing of stored conversation turns into question/answer exchanges
//! - The chat prompt template with context, links, history, and
//!   per-agent instruction sections

use crate::pipeline::{ConversationTurn, Sender, WebResult};

/// History snippets embedded in the prompt are clipped to this length.
const HISTORY_CLIP_CHARS: usize = 100;

/// Only the most recent exchanges are embedded in the prompt.
const HISTORY_MAX_EXCHANGES: usize = 3;

/// At most this many links are listed in the prompt.
const PROMPT_MAX_LINKS: usize = 3;

/// A user question paired with the answer it received.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationExchange {
    pub question: String,
    pub answer: String,
}

/// Collapses a flat message list into question/answer exchanges.
///
/// A user message opens a new exchange; a bot message fills the answer
/// of the latest open exchange. Bot messages with no preceding user
/// message are dropped.
pub fn pair_exchanges(turns: &[ConversationTurn]) -> Vec<ConversationExchange> {
    let mut exchanges: Vec<ConversationExchange> = Vec::new();

    for turn in turns {
        match turn.sender {
            Sender::User => exchanges.push(ConversationExchange {
                question: turn.text.clone(),
                answer: String::new(),
            }),
            Sender::Bot => {
                if let Some(last) = exchanges.last_mut() {
                    last.answer = turn.text.clone();
                }
            }
        }
    }

    exchanges
}

/// Everything the prompt template needs, borrowed from the caller.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    /// Current user question
    pub message: &'a str,
    /// Assembled context block
    pub context: &'a str,
    /// Links that passed the relevance gate
    pub links: &'a [WebResult],
    /// Prior exchanges, oldest first
    pub history: &'a [ConversationExchange],
    /// Extra instructions attached to the agent, if any
    pub agent_instructions: Option<&'a str>,
}

fn clip_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Renders the chat prompt.
///
/// The link list and the matching guidance line appear only when links
/// were gated in, and only complete exchanges from the recent history
/// are included.
pub fn build_chat_prompt(inputs: &PromptInputs<'_>) -> String {
    let mut links_text = String::new();
    let mut link_guidance = "";
    if !inputs.links.is_empty() {
        links_text.push_str("\n\nRELEVANT LINKS (include these when helpful):\n");
        for (i, link) in inputs.links.iter().take(PROMPT_MAX_LINKS).enumerate() {
            links_text.push_str(&format!("{}. [{}]({})\n", i + 1, link.title, link.url));
        }
        link_guidance = "- When you have relevant links, include them naturally in your response\n";
    }

    let mut history_context = String::new();
    if !inputs.history.is_empty() {
        history_context.push_str("\n\nCONVERSATION CONTEXT (recent exchanges):\n");
        let tail_start = inputs.history.len().saturating_sub(HISTORY_MAX_EXCHANGES);
        for (i, exchange) in inputs.history[tail_start..].iter().enumerate() {
            if exchange.question.is_empty() || exchange.answer.is_empty() {
                continue;
            }
            history_context.push_str(&format!(
                "Previous Q{}: {}...\n",
                i + 1,
                clip_chars(&exchange.question, HISTORY_CLIP_CHARS)
            ));
            history_context.push_str(&format!(
                "Previous A{}: {}...\n\n",
                i + 1,
                clip_chars(&exchange.answer, HISTORY_CLIP_CHARS)
            ));
        }
    }

    let agent_instructions = match inputs.agent_instructions {
        Some(instructions) if !instructions.is_empty() => {
            format!("\n\nAGENT-SPECIFIC INSTRUCTIONS:\n{}", instructions)
        }
        _ => String::new(),
    };

    format!(
        "You are a friendly technical support chatbot helping maintenance technicians. Provide helpful, conversational answers based on the information below.

Technical Documentation:
{context}{links_text}{history_context}

Extra instructions for your response:
{agent_instructions}

User Question: {message}

CHATBOT RESPONSE GUIDELINES:
- Be conversational and helpful, like talking to a colleague
- Keep initial answers concise (2-3 sentences) but offer to elaborate
- Use bullet points for step-by-step instructions
- Include part numbers and safety warnings when available
{link_guidance}- If info is incomplete, suggest specific next steps or resources
- Use friendly language: \"Here's what I found...\", \"You'll want to...\", \"Let me help with that...\"
- Reference previous conversation when relevant
- Follow any agent-specific instructions provided above

EXAMPLE RESPONSES:
Q: \"How do I reset the system?\"
To reset the system, press and hold the reset button for 5 seconds - you'll find it on the main control panel (Part #RST-001).

Q: \"What's the operating temperature range?\"
The operating range is -10°C to 60°C. Need to know anything specific about temperature monitoring or troubleshooting?

Q: \"How do I replace the filter?\"
Here's how to replace the filter:

• **First, turn off power** and unplug the unit for safety
• Remove the front panel by pressing the two side tabs
• Slide out the old filter (Part #FLT-200) and dispose of it
• Insert the new filter until you hear it click into place
• Reattach the panel and power back up

Need help finding the right replacement filter or have questions about the process?

Your response:",
        context = inputs.context,
        links_text = links_text,
        history_context = history_context,
        agent_instructions = agent_instructions,
        message = inputs.message,
        link_guidance = link_guidance,
    )
}
