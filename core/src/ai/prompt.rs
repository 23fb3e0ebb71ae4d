use serde::{Deserialize, Serialize};

use super::Hexagram;

const YAO_NAMES: [&str; 6] = ["初爻", "二爻", "三爻", "四爻", "五爻", "上爻"];

const GENERIC_QUESTION: &str = "用户未提供具体问题，请给出一般性解读";

/// Everything needed to ask the model for a reading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterpretationRequest {
    #[serde(default)]
    pub question: Option<String>,
    pub original_hexagram: Hexagram,
    #[serde(default)]
    pub changed_hexagram: Option<Hexagram>,
    /// Zero-based line positions, bottom line first.
    #[serde(default)]
    pub moving_yao_positions: Vec<usize>,
}

impl InterpretationRequest {
    pub fn prompt(&self) -> String {
        build_prompt(
            self.question.as_deref(),
            &self.original_hexagram,
            self.changed_hexagram.as_ref(),
            &self.moving_yao_positions,
        )
    }
}

pub fn build_prompt(
    question: Option<&str>,
    original: &Hexagram,
    changed: Option<&Hexagram>,
    moving_yao_positions: &[usize],
) -> String {
    let moving_yao_text = if moving_yao_positions.is_empty() {
        "无".to_string()
    } else {
        moving_yao_positions
            .iter()
            .map(|p| format!("第{}爻", p + 1))
            .collect::<Vec<_>>()
            .join("、")
    };

    let changed_text = match changed {
        Some(h) => format!("{}（{}）", h.name, h.description.as_deref().unwrap_or_default()),
        None => "无变卦".to_string(),
    };

    let question = question
        .filter(|q| !q.trim().is_empty())
        .unwrap_or(GENERIC_QUESTION);

    format!(
        "你是一位精通六爻预测的易学大师，请用通俗易懂的语言解读以下卦象。

【用户问题】{question}
【本卦】{name}：{description}
【卦辞】{guaci}
【彖辞】{tuanci}
【象辞】{xiangci}
【变卦】{changed_text}
【动爻】{moving_yao_text}

请从以下角度解读：
1. 这个卦象整体意味着什么？
2. 针对用户的问题，有什么具体启示？
3. 有什么建议和注意事项？

请用白话文回答，避免使用专业术语，让普通人也能理解。回答控制在500字以内。",
        name = original.name,
        description = original.description.as_deref().unwrap_or_default(),
        guaci = original.guaci,
        tuanci = original.tuanci,
        xiangci = original.xiangci,
    )
}

/// Human readable summary of the moving lines, e.g. `初爻、五爻 动`.
pub fn moving_yao_description(positions: &[usize]) -> String {
    if positions.is_empty() {
        return "无动爻".to_string();
    }
    let names = positions
        .iter()
        .filter_map(|&p| YAO_NAMES.get(p).copied())
        .collect::<Vec<_>>();
    format!("{} 动", names.join("、"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qian() -> Hexagram {
        Hexagram {
            name: "乾".into(),
            description: Some("乾为天".into()),
            guaci: "元亨利贞".into(),
            tuanci: "大哉乾元".into(),
            xiangci: "天行健，君子以自强不息".into(),
        }
    }

    fn gou() -> Hexagram {
        Hexagram {
            name: "姤".into(),
            description: Some("天风姤".into()),
            ..Hexagram::default()
        }
    }

    #[test]
    fn prompt_includes_all_canonical_texts() {
        let prompt = build_prompt(Some("事业如何？"), &qian(), Some(&gou()), &[0]);
        assert!(prompt.starts_with("你是一位精通六爻预测的易学大师"));
        assert!(prompt.contains("【用户问题】事业如何？"));
        assert!(prompt.contains("【本卦】乾：乾为天"));
        assert!(prompt.contains("【卦辞】元亨利贞"));
        assert!(prompt.contains("【彖辞】大哉乾元"));
        assert!(prompt.contains("【象辞】天行健，君子以自强不息"));
        assert!(prompt.contains("【变卦】姤（天风姤）"));
        assert!(prompt.contains("【动爻】第1爻"));
        assert!(prompt.ends_with("回答控制在500字以内。"));
    }

    #[test]
    fn prompt_falls_back_when_inputs_missing() {
        let mut original = qian();
        original.description = None;
        let prompt = build_prompt(Some("  "), &original, None, &[]);
        assert!(prompt.contains("【用户问题】用户未提供具体问题，请给出一般性解读"));
        assert!(prompt.contains("【本卦】乾：\n"));
        assert!(prompt.contains("【变卦】无变卦"));
        assert!(prompt.contains("【动爻】无\n"));
    }

    #[test]
    fn moving_positions_are_one_based_in_prompt() {
        let prompt = build_prompt(None, &qian(), None, &[1, 4]);
        assert!(prompt.contains("【动爻】第2爻、第5爻"));
    }

    #[test]
    fn request_prompt_matches_free_function() {
        let request = InterpretationRequest {
            question: Some("婚姻".into()),
            original_hexagram: qian(),
            changed_hexagram: None,
            moving_yao_positions: vec![5],
        };
        assert_eq!(request.prompt(), build_prompt(Some("婚姻"), &qian(), None, &[5]));
    }

    #[test]
    fn moving_yao_description_uses_traditional_names() {
        assert_eq!(moving_yao_description(&[]), "无动爻");
        assert_eq!(moving_yao_description(&[0, 5]), "初爻、上爻 动");
        assert_eq!(moving_yao_description(&[2, 9]), "三爻 动");
    }
}
