//! Versioned, section-type-specific prompt templates for problem
//! extraction (§4.12). Each function is a pure function of its inputs
//! so prompts stay reproducible and testable without an LLM.

use super::segmenter::SectionType;

pub const PROMPT_VERSION: u32 = 1;

/// Build the extraction prompt for a section of the given type. Certain
/// section types (limitations, future work, discussion, conclusion,
/// introduction) get a template tuned to how open problems usually show
/// up in that kind of prose; everything else falls back to a generic
/// template.
pub fn extraction_prompt(section_type: SectionType, section_title: &str, section_content: &str) -> String {
    let instructions = match section_type {
        SectionType::Limitations => {
            "This is a Limitations section. Look for problems the authors admit \
             their work does not solve, constraints they had to accept, or gaps \
             they call out explicitly."
        }
        SectionType::FutureWork => {
            "This is a Future Work section. Look for problems the authors propose \
             leaving to later work, open directions, or extensions they did not \
             attempt."
        }
        SectionType::Discussion => {
            "This is a Discussion section. Look for problems raised when the \
             authors reflect on unexpected results, failure cases, or unresolved \
             questions about their method."
        }
        SectionType::Conclusion => {
            "This is a Conclusion section. Look for problems mentioned as \
             remaining open even after summarizing the contribution."
        }
        SectionType::Introduction => {
            "This is an Introduction section. Look for problems the authors frame \
             as motivating their work, especially gaps in prior approaches they \
             say are still unsolved."
        }
        _ => {
            "Look for any problem statements describing open, unsolved, or \
             partially-solved research problems in this section."
        }
    };

    format!(
        "{instructions}\n\n\
         Section: {section_title}\n\
         ---\n\
         {section_content}\n\
         ---\n\n\
         For each distinct problem you find, return an object with:\n\
         - statement: a self-contained description of the problem (at least \
           a full sentence)\n\
         - confidence: your confidence this is a genuine open problem, in [0, 1]\n\
         - quoted_text: a verbatim span from the section above supporting the \
           statement\n\n\
         Return zero objects if the section describes no open problems. Do not \
         invent a quoted_text span that does not appear in the section text."
    )
}
