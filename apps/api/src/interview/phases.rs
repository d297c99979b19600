//! Phase table for the scripted mock interview.
//!
//! The interview walks these phases in order. Each phase lists the data the
//! candidate's answers must supply before the interviewer moves on.

use serde::{Deserialize, Serialize};

/// One stage of the interview script.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseConfig {
    pub id: &'static str,
    pub title: &'static str,
    /// Interviewer instructions for phrasing questions in this phase.
    pub prompt: &'static str,
    /// Asked verbatim when the phase opens without an LLM rephrase.
    pub opening_question: &'static str,
    pub expected_data: &'static [&'static str],
}

const PHASES: &[PhaseConfig] = &[
    PhaseConfig {
        id: "self_introduction",
        title: "自己紹介",
        prompt: "候補者に簡潔な自己紹介を求めてください。氏名、所属（大学・学部など）、\
            これまでの経験の要約を1分程度で話してもらうことが目的です。",
        opening_question: "それでは面接を始めます。まずは1分程度で自己紹介をお願いします。",
        expected_data: &["name", "affiliation", "summary"],
    },
    PhaseConfig {
        id: "motivation",
        title: "志望動機",
        prompt: "志望動機を深掘りしてください。なぜこの業界なのか、なぜこの会社なのか、\
            入社後に実現したいことを具体的に引き出すことが目的です。",
        opening_question: "当社を志望された理由を教えてください。",
        expected_data: &["reason_for_industry", "reason_for_company", "career_goal"],
    },
    PhaseConfig {
        id: "gakuchika",
        title: "学生時代に力を入れたこと",
        prompt: "学生時代に最も力を入れた取り組みについて質問してください。\
            具体的なエピソード、候補者の役割、直面した課題への行動、その結果を引き出すことが目的です。",
        opening_question: "学生時代に最も力を入れて取り組んだことを教えてください。",
        expected_data: &["episode", "role", "action", "result"],
    },
    PhaseConfig {
        id: "strengths",
        title: "強み",
        prompt: "候補者の強みを質問してください。強みそのものと、それを裏付ける具体的な経験を\
            引き出すことが目的です。",
        opening_question: "あなたの強みは何ですか。具体的なエピソードを交えて教えてください。",
        expected_data: &["strength", "evidence"],
    },
    PhaseConfig {
        id: "weaknesses",
        title: "弱み",
        prompt: "候補者の弱みを質問してください。弱みの自己認識と、それを改善するための\
            取り組みを引き出すことが目的です。",
        opening_question: "ご自身の弱みと、それをどのように克服しようとしているか教えてください。",
        expected_data: &["weakness", "improvement"],
    },
    PhaseConfig {
        id: "industry_specific",
        title: "業界別質問",
        prompt: "{industry}業界の面接で頻出する質問をしてください。着眼点: {industry_focus}\
            業界理解の深さと、候補者がどのように貢献できるかを引き出すことが目的です。",
        opening_question: "この業界の今後の課題と、その中であなたがどのように貢献できるかを教えてください。",
        expected_data: &["industry_understanding", "contribution"],
    },
    PhaseConfig {
        id: "reverse_question",
        title: "逆質問",
        prompt: "面接の最後に、候補者から面接官への質問（逆質問）を促してください。",
        opening_question: "最後に、何か質問はありますか。",
        expected_data: &["question"],
    },
];

/// All phases in interview order.
pub fn default_phases() -> &'static [PhaseConfig] {
    PHASES
}

pub fn first_phase() -> &'static PhaseConfig {
    &PHASES[0]
}

pub fn find_phase(id: &str) -> Option<&'static PhaseConfig> {
    PHASES.iter().find(|p| p.id == id)
}

/// The phase after `id`, or `None` when `id` is last or unknown.
pub fn next_phase(id: &str) -> Option<&'static PhaseConfig> {
    let index = PHASES.iter().position(|p| p.id == id)?;
    PHASES.get(index + 1)
}

/// Zero-based position of a phase in the script.
pub fn phase_index(id: &str) -> Option<usize> {
    PHASES.iter().position(|p| p.id == id)
}

/// Target industry of a mock interview. Selects the industry-specific phase wording.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Industry {
    It,
    Finance,
    TradingCompany,
    Manufacturer,
    Consulting,
    Advertising,
    #[default]
    General,
}

impl Industry {
    pub fn as_str(&self) -> &'static str {
        match self {
            Industry::It => "it",
            Industry::Finance => "finance",
            Industry::TradingCompany => "trading_company",
            Industry::Manufacturer => "manufacturer",
            Industry::Consulting => "consulting",
            Industry::Advertising => "advertising",
            Industry::General => "general",
        }
    }

    /// Parses the stored column value; unknown values fall back to `General`.
    pub fn from_db(s: &str) -> Self {
        match s {
            "it" => Industry::It,
            "finance" => Industry::Finance,
            "trading_company" => Industry::TradingCompany,
            "manufacturer" => Industry::Manufacturer,
            "consulting" => Industry::Consulting,
            "advertising" => Industry::Advertising,
            _ => Industry::General,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Industry::It => "IT",
            Industry::Finance => "金融",
            Industry::TradingCompany => "商社",
            Industry::Manufacturer => "メーカー",
            Industry::Consulting => "コンサルティング",
            Industry::Advertising => "広告",
            Industry::General => "一般企業",
        }
    }

    pub fn focus(&self) -> &'static str {
        match self {
            Industry::It => "技術トレンドへの関心と、学び続ける姿勢。",
            Industry::Finance => "信頼性・正確性への意識と、経済動向への理解。",
            Industry::TradingCompany => "ビジネスを創る主体性と、海外や多様な関係者と協働する力。",
            Industry::Manufacturer => "ものづくりへの関心と、品質・現場へのこだわり。",
            Industry::Consulting => "論理的思考力と、クライアントの課題に向き合う姿勢。",
            Industry::Advertising => "発想力と、生活者の視点で物事を捉える力。",
            Industry::General => "事業内容への理解と、入社後の活躍イメージ。",
        }
    }
}

/// Renders a phase's interviewer prompt for the given industry.
pub fn render_phase_prompt(phase: &PhaseConfig, industry: Industry) -> String {
    phase
        .prompt
        .replace("{industry}", industry.label())
        .replace("{industry_focus}", industry.focus())
}

/// Japanese description of an expected data key, shown to the LLM.
pub fn describe_key(key: &str) -> &'static str {
    match key {
        "name" => "氏名",
        "affiliation" => "所属（大学・学部・学科など）",
        "summary" => "経験や人柄の要約",
        "reason_for_industry" => "その業界を志望する理由",
        "reason_for_company" => "その会社を志望する理由",
        "career_goal" => "入社後に実現したいこと",
        "episode" => "取り組みの具体的なエピソード",
        "role" => "その中での本人の役割",
        "action" => "課題に対して本人がとった行動",
        "result" => "行動の結果や成果",
        "strength" => "本人の強み",
        "evidence" => "強みを裏付ける具体的な経験",
        "weakness" => "本人の弱み",
        "improvement" => "弱みを改善するための取り組み",
        "industry_understanding" => "業界に対する理解",
        "contribution" => "本人がどのように貢献できるか",
        "question" => "面接官への質問",
        _ => "回答内容",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_phase_ids_are_unique() {
        let ids: HashSet<_> = default_phases().iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), default_phases().len());
    }

    #[test]
    fn test_every_phase_expects_unique_keys() {
        for phase in default_phases() {
            assert!(!phase.expected_data.is_empty(), "{} has no keys", phase.id);
            let keys: HashSet<_> = phase.expected_data.iter().collect();
            assert_eq!(keys.len(), phase.expected_data.len(), "{} repeats a key", phase.id);
        }
    }

    #[test]
    fn test_every_key_has_a_description() {
        for phase in default_phases() {
            for key in phase.expected_data {
                assert_ne!(describe_key(key), "回答内容", "{key} is undescribed");
            }
        }
    }

    #[test]
    fn test_next_phase_walks_in_order() {
        assert_eq!(first_phase().id, "self_introduction");
        assert_eq!(next_phase("self_introduction").unwrap().id, "motivation");
        assert!(next_phase("reverse_question").is_none());
        assert!(next_phase("no_such_phase").is_none());
    }

    #[test]
    fn test_industry_prompt_is_rendered() {
        let phase = find_phase("industry_specific").unwrap();
        let prompt = render_phase_prompt(phase, Industry::TradingCompany);
        assert!(prompt.contains("商社"));
        assert!(!prompt.contains("{industry"));
    }

    #[test]
    fn test_industry_round_trips_through_db_value() {
        for industry in [
            Industry::It,
            Industry::Finance,
            Industry::TradingCompany,
            Industry::Manufacturer,
            Industry::Consulting,
            Industry::Advertising,
            Industry::General,
        ] {
            assert_eq!(Industry::from_db(industry.as_str()), industry);
        }
        assert_eq!(Industry::from_db("space"), Industry::General);
    }

    #[test]
    fn test_industry_deserializes_snake_case() {
        let industry: Industry = serde_json::from_str(r#""trading_company""#).unwrap();
        assert_eq!(industry, Industry::TradingCompany);
    }
}
