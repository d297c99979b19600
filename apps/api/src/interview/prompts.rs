// Interview LLM prompt templates.
// All prompts for the interview module are defined here.

/// Role for the per-answer field extraction call.
pub const ASSESS_ROLE: &str = "You are a careful Japanese job-interview analyst. \
    Read a candidate's answer and extract only the facts the candidate actually stated. \
    Never infer or invent values.";

/// Field extraction prompt.
/// Replace: {phase_title}, {question}, {answer}, {fields}, {schema}
pub const ASSESS_PROMPT_TEMPLATE: &str = r#"面接フェーズ「{phase_title}」での候補者の回答から、以下の項目を抽出してください。

面接官の質問:
{question}

候補者の回答:
{answer}

抽出する項目:
{fields}

ルール:
1. 回答の中で候補者が明確に述べている内容だけを、簡潔な日本語で要約して値にしてください。
2. 述べられていない項目、曖昧な項目は null にしてください。推測は禁止です。
3. 項目キーは上記のものだけを使ってください。

Return a JSON object with this EXACT schema:
{schema}"#;

/// System prompt for phrasing the interviewer's next question.
pub const QUESTION_SYSTEM: &str = "あなたは日本企業の新卒採用面接官です。\
    丁寧かつ自然な話し言葉で、一度に一つだけ質問してください。\
    出力は面接官の発話のみとし、前置き・解説・引用符は付けないでください。";

/// Next-question prompt.
/// Replace: {company}, {industry}, {phase_title}, {phase_prompt}, {instruction}, {history}
pub const QUESTION_PROMPT_TEMPLATE: &str = r#"応募先企業: {company}
業界: {industry}

現在の面接フェーズ: {phase_title}
フェーズの目的: {phase_prompt}

指示:
{instruction}

これまでの会話（新しいものが最後）:
{history}

面接官として次に話す一言を、2文以内で出力してください。"#;

/// Instruction when the phase still lacks fields.
/// Replace: {missing}
pub const FOLLOW_UP_INSTRUCTION: &str = "直前の回答では次の点がまだ十分に語られていません。\
    回答内容に軽く触れたうえで、これらを引き出す深掘り質問をしてください。\n{missing}";

/// Instruction when a new phase opens.
/// Replace: {opening_question}
pub const NEW_PHASE_INSTRUCTION: &str = "前のフェーズは終了しました。\
    直前の回答に短くお礼を述べてから、このフェーズの最初の質問に移ってください。\
    質問の例: {opening_question}";

/// Spoken once the last phase closes.
pub const CLOSING_MESSAGE: &str =
    "以上で面接は終了です。本日はお時間をいただき、ありがとうございました。";

/// Role for the post-interview evaluation call.
pub const FEEDBACK_ROLE: &str = "You are an experienced Japanese recruiter who coaches \
    students after mock interviews. Evaluate fairly and concretely, quoting the transcript.";

/// Feedback prompt.
/// Replace: {company}, {industry}, {transcript}, {weak_phases}, {collected}
pub const FEEDBACK_PROMPT_TEMPLATE: &str = r#"以下は模擬面接の記録です。候補者へのフィードバックを作成してください。

応募先企業: {company}
業界: {industry}

面接記録:
{transcript}

質問を重ねても十分な回答が得られなかったフェーズ:
{weak_phases}

面接中に抽出された情報:
{collected}

Return a JSON object with this EXACT schema (scores are integers 0-100):
{
  "scores": {
    "logic": 70,
    "specificity": 60,
    "enthusiasm": 80,
    "communication": 75
  },
  "good_points": ["具体的な良かった点"],
  "improvement_points": ["具体的な改善点"],
  "summary": "全体講評（200字程度）"
}

採点基準:
- logic（論理性）: 結論から話し、理由と根拠が筋道立っているか
- specificity（具体性）: 数字や固有のエピソードで裏付けているか
- enthusiasm（熱意）: 志望度や意欲が伝わるか
- communication（伝わりやすさ）: 質問の意図に沿って簡潔に答えているか"#;
