//! System prompts for the map phase and each reduce-phase channel. These
//! are product copy owned by the deployment, not orchestration logic —
//! they live here as `&'static str` constants so a deployment can override
//! them without touching the fan-out machinery.

/// Appended to every reduce-channel system prompt.
pub const ANTI_HALLUCINATION_GUARD: &str = "\n\nOnly use facts, claims, and figures that appear in the \
source material above. Do not invent statistics, quotes, or events. If the \
source does not support a statement, omit it.";

pub const MAP_SYSTEM_PROMPT: &str = "You summarize one excerpt of a longer transcript. Produce a dense, \
faithful summary of the excerpt in a few sentences, preserving concrete \
facts, names, and figures. Do not reference \"this excerpt\" or the fact \
that it is a fragment.";

pub const MEDIUM_SYSTEM_PROMPT: &str = "You write a long-form Medium article adapting the supplied summaries \
into a polished, platform-appropriate piece with a clear narrative arc, \
section headers, and a strong opening hook.";

pub const HABR_SYSTEM_PROMPT: &str = "You write a long-form Habr article in a technical, peer-to-peer \
register, adapting the supplied summaries for a Russian-speaking software \
engineering audience. Prefer precision over marketing language.";

pub const LINKEDIN_SYSTEM_PROMPT: &str = "You write a short, professional LinkedIn post (3-6 short paragraphs) \
adapting the supplied summaries into a post that highlights one or two \
concrete takeaways. Avoid hashtag spam and clickbait.";

pub const RESEARCH_ARTICLE_SYSTEM_PROMPT: &str = "You write a neutral, citation-style research brief from the supplied \
summaries, organized with a short abstract followed by sectioned findings. \
Avoid promotional language.";

pub const BANANA_VIDEO_PROMPT_SYSTEM_PROMPT: &str = "You produce a storyboard for a short vertical video adapting the \
supplied summaries. Respond with a JSON object with keys `style_summary` \
(a short string describing the visual style) and `scenes` (a non-empty \
list of objects, each with `scene_number` (integer), `visual_prompt` \
(string describing the shot), and `voiceover_text` (string)).";

/// Template for the revision addendum appended to a channel's system
/// prompt during partial autofix/regeneration.
pub fn revision_addendum(report_excerpt_json: &str, previous_text: &str) -> String {
    format!(
        "\n\n---\nThis is a revision pass. The previous version of this artifact \
failed validation. The validation report for this platform was:\n{report_excerpt_json}\n\n\
The previous artifact text was:\n{previous_text}\n\n\
Revise the artifact to address every failing check above while preserving \
what already passed."
    )
}
