// ES correction prompt templates.

/// Role for the correction call. Combined with the Japanese output rule.
pub const CORRECTION_ROLE: &str = "You are a veteran Japanese career advisor who reviews \
    entry-sheet (ES) answers for new-graduate job applications. Judge how well the answer \
    responds to the question and rewrite it without inventing experiences.";

/// Correction prompt.
/// Replace: {company}, {question}, {answer}, {char_count}, {limit_rule}
pub const CORRECTION_PROMPT_TEMPLATE: &str = r#"以下のエントリーシートの回答を添削してください。

応募先企業: {company}

設問:
{question}

回答（現在 {char_count} 文字）:
{answer}

文字数の条件:
{limit_rule}

添削ルール:
1. 設問に正面から答えているか、結論が最初にあるかを確認してください。
2. 回答にない経験や数字を付け加えないでください。
3. revised_text は改行を含めず、そのまま提出できる完成文にしてください。

Return a JSON object with this EXACT schema (score is an integer 0-100):
{
  "score": 72,
  "good_points": ["良い点"],
  "improvement_points": ["改善点"],
  "revised_text": "添削後の回答"
}"#;

/// Used when a character limit is given.
/// Replace: {char_limit}
pub const LIMIT_RULE: &str =
    "revised_text は {char_limit} 文字以内（改行を除く）に収めてください。上限の9割程度を目安にしてください。";

pub const NO_LIMIT_RULE: &str = "指定なし。元の回答と同程度の長さにしてください。";

/// Appended on retry when the previous rewrite ran over the limit.
/// Replace: {previous_count}, {char_limit}, {previous_text}
pub const SHORTEN_INSTRUCTION: &str = r#"

前回の revised_text は {previous_count} 文字で、上限の {char_limit} 文字を超えていました。
前回の revised_text:
{previous_text}

内容の要点を保ったまま、冗長な表現を削って {char_limit} 文字以内に短くしてください。"#;
