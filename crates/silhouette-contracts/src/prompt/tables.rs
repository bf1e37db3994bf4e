//! Category lookup tables. Each row lists the labels a caller may send
//! (the Korean UI label first, then English slugs) and the English phrase
//! used in the prompt.

pub type Table = &'static [(&'static [&'static str], &'static str)];

pub const AGE: Table = &[
    (&["어린이", "child", "kid"], "child aged 6-12"),
    (&["청소년", "teen", "teenager"], "teenager aged 13-17"),
    (&["청년", "young-adult", "young"], "young adult aged 18-29"),
    (&["성인", "adult"], "adult aged 30-45"),
    (&["중년", "middle-aged", "middle"], "middle-aged person aged 46-60"),
    (&["노년", "elderly", "senior"], "elderly person aged 60+"),
];

pub const GENDER: Table = &[
    (&["남성", "male", "man"], "male"),
    (&["여성", "female", "woman"], "female"),
    (&["중성", "neutral", "non-binary"], "gender-neutral person"),
];

pub const ETHNICITY: Table = &[
    (&["동아시아", "east-asian", "korean", "japanese", "chinese"], "East Asian"),
    (&["서양", "caucasian", "western"], "Caucasian"),
    (&["아프리카", "african", "black"], "African"),
    (&["중동", "middle-eastern"], "Middle Eastern"),
    (&["남아시아", "south-asian"], "South Asian"),
    (&["라틴", "latin", "latin-american"], "Latin American"),
];

pub const CLOTHING: Table = &[
    (&["정장", "suit", "formal"], "formal business suit"),
    (&["캐주얼", "casual"], "casual clothing"),
    (&["경찰관 제복", "police"], "police officer uniform"),
    (&["판사 법복", "judge"], "judge robe"),
    (&["소방관 방화복", "firefighter"], "firefighter protective gear"),
    (&["의사 가운", "doctor"], "doctor white coat"),
    (&["배낭을 멘 학생", "student"], "student wearing backpack"),
    (&["운동복", "sportswear", "athletic"], "athletic sportswear"),
    (&["작업복", "workwear", "work"], "work uniform"),
    (&["한복", "hanbok"], "traditional Korean hanbok"),
];

pub const DEFAULT_AGE: &str = "성인";
pub const DEFAULT_GENDER: &str = "남성";
pub const DEFAULT_ETHNICITY: &str = "동아시아";
pub const DEFAULT_CLOTHING: &str = "formal business suit";

/// Maps a label through `table`; unknown labels come back unchanged.
pub fn translate(table: Table, raw: &str) -> String {
    let trimmed = raw.trim();
    table
        .iter()
        .find(|(labels, _)| {
            labels
                .iter()
                .any(|label| label.eq_ignore_ascii_case(trimmed))
        })
        .map(|(_, english)| (*english).to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Every label a table accepts, first spelling per row.
pub fn primary_labels(table: Table) -> Vec<&'static str> {
    table.iter().filter_map(|(labels, _)| labels.first().copied()).collect()
}
