use crate::solver::SolverRequest;

const ROLE: &str = "# ROLE
You are an expert academic tutor with deep knowledge across all subjects. Your primary responsibility is ACCURACY above all else.
";

const CORE_PRINCIPLES: &str = "# CORE PRINCIPLES
1. **NEVER GUESS OR HALLUCINATE** - If you don't know something with certainty, explicitly state \"I'm not certain about this\" or \"This requires verification\"
2. **FACT-CHECK YOURSELF** - Before stating any fact, verify it mentally against your knowledge
3. **SHOW YOUR REASONING** - Every step must be justified with clear logic
4. **ADMIT LIMITATIONS** - If a problem is ambiguous or lacks information, point this out
5. **USE RELIABLE METHODS** - Stick to established formulas, theorems, and principles
";

const TASK_HEADER: &str = "# TASK
Solve the following homework problem with absolute precision and clarity.
";

const METHODOLOGY: &str = "# METHODOLOGY
You MUST follow this exact structure:

## 1. Problem Understanding & Analysis
- Read the problem carefully and identify what is being asked
- List ALL given information explicitly
- Identify what needs to be found
- If an image is provided, describe all relevant details you can extract from it
- State any assumptions you need to make (and why they're reasonable)
- Identify the core concepts, formulas, or principles that apply

## 2. Solution Strategy
- Outline your approach BEFORE solving
- Explain WHY this approach will work
- Mention alternative methods if applicable

## 3. Step-by-Step Solution
- Execute your solution with clear, numbered steps
- Show ALL calculations - do not skip steps
- Explain the reasoning behind each step
- Use proper mathematical notation (LaTeX format: $$...$$ for display, $...$ for inline)
- Double-check each calculation as you go
- If you make an assumption, clearly state it

## 4. Verification & Quality Check
- Review your solution for mathematical errors
- Verify the answer makes logical/physical sense (check units, magnitude, sign)
- If possible, verify using an alternative method or by substituting back
- State your confidence level (High/Medium/Low) and explain why

## 5. Final Answer
- Present the final answer in a clear, highlighted block using this format:
  **FINAL ANSWER:** [Your answer here]
- Include proper units if applicable
- Summarize the key concept or learning point
";

const ACCURACY_RULES: &str = "# CRITICAL ACCURACY RULES
⚠️ **MANDATORY REQUIREMENTS:**
1. If you're uncertain about ANY fact, formula, or concept - SAY SO explicitly
2. Never make up formulas, dates, facts, or definitions
3. If the problem is ambiguous or missing information, point this out
4. For factual questions (history, science facts, etc.), only state what you're certain about
5. Use standard, well-established methods - don't invent new approaches
6. Double-check all arithmetic and algebraic manipulations
7. Verify your final answer makes sense in the context of the problem
";

const FORMATTING_RULES: &str = "# FORMATTING REQUIREMENTS
- Use Markdown for structure
- Use LaTeX for ALL mathematical expressions
- Use **bold** for key terms and the final answer
- Use proper headings (##, ###) for organization
- Make the output visually clear and easy to follow
";

const IMAGE_INSTRUCTION: &str = "**[Image Analysis Required]**: An image has been uploaded. Carefully analyze all visual information and incorporate it into your solution.";

/// Build the tutoring instruction sent with a solver submission.
///
/// Task parameters appear in a fixed order and each labeled line is left
/// out entirely when its field is blank.
pub fn build_prompt(request: &SolverRequest) -> String {
    let mut prompt = String::new();

    prompt.push_str(ROLE);
    prompt.push('\n');
    prompt.push_str(CORE_PRINCIPLES);
    prompt.push('\n');
    prompt.push_str(TASK_HEADER);
    prompt.push('\n');

    let parameters = [
        ("Subject", &request.subject),
        ("Level", &request.level),
        ("Language", &request.language),
        ("Question", &request.question),
        ("Additional Notes", &request.notes),
    ];
    for (label, value) in parameters {
        if !value.trim().is_empty() {
            prompt.push_str(&format!("**{}:** {}\n", label, value));
        }
    }

    prompt.push('\n');
    prompt.push_str(METHODOLOGY);
    prompt.push('\n');
    prompt.push_str(ACCURACY_RULES);
    prompt.push('\n');
    prompt.push_str(FORMATTING_RULES);

    if request.image.is_some() {
        prompt.push('\n');
        prompt.push_str(IMAGE_INSTRUCTION);
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::ImageAttachment;

    fn request() -> SolverRequest {
        SolverRequest {
            question: "What is the derivative of x^2?".to_string(),
            subject: "Mathematics".to_string(),
            level: "High School".to_string(),
            language: "English".to_string(),
            notes: "Show the limit definition".to_string(),
            image: None,
        }
    }

    #[test]
    fn test_all_fields_present_verbatim() {
        let prompt = build_prompt(&request());
        assert!(prompt.contains("**Subject:** Mathematics\n"));
        assert!(prompt.contains("**Level:** High School\n"));
        assert!(prompt.contains("**Language:** English\n"));
        assert!(prompt.contains("**Question:** What is the derivative of x^2?\n"));
        assert!(prompt.contains("**Additional Notes:** Show the limit definition\n"));
    }

    #[test]
    fn test_empty_fields_are_omitted() {
        let prompt = build_prompt(&SolverRequest {
            subject: String::new(),
            notes: "   ".to_string(),
            ..request()
        });
        assert!(!prompt.contains("**Subject:**"));
        assert!(!prompt.contains("**Additional Notes:**"));
        assert!(prompt.contains("**Question:**"));
    }

    #[test]
    fn test_sections_in_fixed_order() {
        let prompt = build_prompt(&request());
        let order = [
            "# ROLE",
            "# CORE PRINCIPLES",
            "# TASK",
            "**Subject:**",
            "**Question:**",
            "# METHODOLOGY",
            "## 1. Problem Understanding & Analysis",
            "## 2. Solution Strategy",
            "## 3. Step-by-Step Solution",
            "## 4. Verification & Quality Check",
            "## 5. Final Answer",
            "# CRITICAL ACCURACY RULES",
            "# FORMATTING REQUIREMENTS",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|marker| prompt.find(marker).unwrap_or_else(|| panic!("missing {}", marker)))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_image_instruction_only_with_image() {
        assert!(!build_prompt(&request()).contains("[Image Analysis Required]"));

        let with_image = SolverRequest {
            question: String::new(),
            image: Some(ImageAttachment {
                mime_type: "image/png".to_string(),
                data: "aGVsbG8=".to_string(),
                file_name: "worksheet.png".to_string(),
                size: 5,
            }),
            ..request()
        };
        let prompt = build_prompt(&with_image);
        assert!(prompt.trim_end().ends_with("incorporate it into your solution."));
        assert!(!prompt.contains("**Question:**"));
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(build_prompt(&request()), build_prompt(&request()));
    }
}
