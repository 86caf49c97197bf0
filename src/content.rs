//! Fixed instructional text shown around the interactive parts of the report.

use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct Objective {
    pub subject: &'static str,
    pub goal: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct Link {
    pub label: &'static str,
    pub url: &'static str,
}

/// Everything on the page that does not depend on the uploaded data.
#[derive(Clone, Debug, Serialize)]
pub struct ReportContent {
    pub title: &'static str,
    pub icon: &'static str,
    pub objectives: Vec<Objective>,
    pub review_caption: &'static str,
    pub review_heading: &'static str,
    /// Embeddable form of the review video.
    pub video_url: &'static str,
    pub lecture_caption: &'static str,
    pub lecture_heading: &'static str,
    pub data_sources: Vec<Link>,
    pub trends_heading: &'static str,
    pub trends_source: &'static str,
    pub upload_prompt: &'static str,
    pub compare_heading: &'static str,
    pub reflection_heading: &'static str,
    pub reflection_prompt: &'static str,
    pub homework_caption: &'static str,
    pub homework_heading: &'static str,
    pub homework_examples: Vec<&'static str>,
}

pub fn report() -> ReportContent {
    ReportContent {
        title: "Future Jobs Forecast Report",
        icon: "/image/job.png",
        objectives: vec![
            Objective {
                subject: "Social studies",
                goal: "Understand the changing world of work and plan your own career path.",
            },
            Objective {
                subject: "Informatics",
                goal: "Find the data you need, make sense of it, and make decisions based on it.",
            },
            Objective {
                subject: "Mathematics",
                goal: "Use software tools to graph data and interpret what the graph means.",
            },
        ],
        review_caption: "Let's review!",
        review_heading: "What jobs are out there?",
        video_url: "https://www.youtube.com/embed/nnUIz_TbznA",
        lecture_caption: "Teacher's lecture",
        lecture_heading: "Where can we find data about employment?",
        data_sources: vec![
            Link {
                label: "Employment and labor statistics",
                url: "http://laborstat.moel.go.kr/",
            },
            Link {
                label: "Korean Labor and Income Panel Study",
                url: "https://www.kli.re.kr/klips/",
            },
        ],
        trends_heading: "How has each occupation changed over time?",
        trends_source: "Data source: employment and labor statistics",
        upload_prompt: "Upload an Excel file (.xlsx or .xls).",
        compare_heading: "Compare occupations over the selected years",
        reflection_heading: "How have occupations changed over time?",
        reflection_prompt: "Write down what you discovered from the graphs.",
        homework_caption: "Today's assignment",
        homework_heading: "What matters most to you, and what question would help you find it?",
        homework_examples: vec![
            "e.g. Money matters to me. Which occupations earn the most? (use wage data)",
            "e.g. Work-life balance matters to me. Which occupations have short hours and long breaks? (use working-hours data)",
        ],
    }
}
