//! The default document plan.
//!
//! A fixed chain — topic → research → outline → two parallel drafts →
//! selection → editor — threading the artifacts `brief` (initial), `topic`,
//! `research`, `outline`, `draft_1`/`draft_2`, `selection` and `final`.

use sitescribe_engine::{PipelinePlan, Stage, StageGroup};

/// Build the default plan for a long-form site document in `language`.
pub fn document_plan(language: &str) -> PipelinePlan {
    let draft_brief = format!(
        "Write the complete article in {language}, following the outline and \
         grounded in the research findings. Aim for 2,000-2,500 words, weave \
         key phrases in naturally, and avoid formulaic openings. Output \
         Markdown only."
    );

    PipelinePlan::new(vec![
        StageGroup::single(Stage::new(
            "topic",
            "Using the brief (site name, URL, optional topic hint), settle on \
             the single strongest article topic for this site. Refine the hint \
             when one is given; otherwise propose the best topic yourself. \
             Reply with the topic phrase only.",
            &["brief"],
            "topic",
        )),
        StageGroup::single(Stage::new(
            "research",
            "Research the site and the chosen topic thoroughly. Query the \
             content index for what the site itself says and use web search \
             for outside context. Return a bullet list of findings, plain \
             text only.",
            &["topic"],
            "research",
        )),
        StageGroup::single(Stage::new(
            "outline",
            "Design a detailed Markdown outline (H2/H3 headings) for the \
             article, grounded in the research findings.",
            &["topic", "research"],
            "outline",
        )),
        StageGroup::parallel(vec![
            Stage::new(
                "draft_a",
                format!("{draft_brief} Favor a practical, example-driven voice."),
                &["outline", "research"],
                "draft_1",
            ),
            Stage::new(
                "draft_b",
                format!("{draft_brief} Favor a narrative, reader-first voice."),
                &["outline", "research"],
                "draft_2",
            ),
        ]),
        StageGroup::single(Stage::new(
            "selection",
            "Compare the two drafts and produce the stronger article, folding \
             in the best passages of the other where they improve it. Output \
             the merged article only.",
            &["draft_1", "draft_2"],
            "selection",
        )),
        StageGroup::single(Stage::new(
            "editor",
            "Polish the selected article: tighten wording, verify the heading \
             structure, and check keyword density stays natural. Append a \
             short review section with a 0-100 score and three concrete \
             improvements.",
            &["selection"],
            "final",
        )),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_is_valid_against_the_brief() {
        document_plan("en").validate("brief").expect("valid plan");
    }

    #[test]
    fn plan_ends_at_the_final_artifact() {
        assert_eq!(document_plan("en").final_artifact(), Some("final"));
    }

    #[test]
    fn drafts_fan_out_and_selection_fans_in() {
        let plan = document_plan("en");
        let draft_group = &plan.groups[3];
        assert_eq!(draft_group.stages.len(), 2);
        assert_eq!(draft_group.stages[0].produces, "draft_1");
        assert_eq!(draft_group.stages[1].produces, "draft_2");

        let selection = &plan.groups[4].stages[0];
        assert!(selection.required.contains(&"draft_1".to_string()));
        assert!(selection.required.contains(&"draft_2".to_string()));
    }

    #[test]
    fn drafts_carry_the_language() {
        let plan = document_plan("fr");
        let draft = &plan.groups[3].stages[0];
        assert!(draft.instructions.contains("in fr"));
    }
}
