/// Build a deterministic summary prompt for a speaker-attributed transcript.
pub fn build_summary_prompt(source_ref: &str, conversation: &str) -> String {
    format!(
        "Summarize the following transcribed recording.\n\
Recording: {source_ref}\n\
\n\
Rules:\n\
- Use only information present in the transcript.\n\
- Open with a one-paragraph overview.\n\
- Follow with bullet points for key topics, one per topic.\n\
- Attribute notable statements to their speaker labels.\n\
- If the transcript is empty or unintelligible, say so plainly.\n\
\n\
Transcript:\n\
{conversation}"
    )
}
