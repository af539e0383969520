//! Chat-model prompts

/// System prompt for generating one interview question
pub const QUESTION_PROMPT: &str = "\
You are an agent that is preparing the user for a job interview. Read the user input and
give only the question you generate. Nothing else.
";

/// Instruction asking the chat model to review a spoken answer.
///
/// The confidence verdict is embedded as plain evidence; the transcribed
/// answer follows the instruction verbatim.
pub fn evaluation_prompt(question: &str, confident: bool, answer: &str) -> String {
    format!(
        "You are an HR agent that is helping someone prepare for their job interview.
The user was given this question: {question}

Besides giving feedback about the content of the user, the fact they are confident is
{confident}. This is very important, as you should give them feedback whether they are
confident or not, to help them prepare.

This is the user's response:
{answer}",
        question = question.trim(),
        confident = confident,
        answer = answer.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluation_prompt_embeds_verdict() {
        let prompt = evaluation_prompt("Tell me about yourself.", false, "  I am a developer. ");
        assert!(prompt.contains("The user was given this question: Tell me about yourself."));
        assert!(prompt.contains("confident is\nfalse."));
        assert!(prompt.ends_with("This is the user's response:\nI am a developer."));

        assert!(evaluation_prompt("Q", true, "").contains("confident is\ntrue."));
    }

    #[test]
    fn test_question_prompt_asks_for_question_only() {
        assert!(QUESTION_PROMPT.contains("only the question"));
    }
}
