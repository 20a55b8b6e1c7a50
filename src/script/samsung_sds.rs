use crate::constants::{
    CHOICE_AWARD, CHOICE_RESOLUTION_DELAY_MS, DOOM_ADVANCE_DELAY_MS, ELEVATOR_AWARD,
    ELEVATOR_BASE_DELAY_MS, ELEVATOR_FLOOR_STEP_MS, ELEVATOR_ORIGIN_FLOOR,
    ELEVATOR_TARGET_FLOOR, ELEVATOR_TOP_FLOOR,
};
use crate::types::{
    ChoiceConfig, ChoiceOption, ChoiceSet, ResolutionDelay, StepKind, StoryStep,
};

fn keyed(options: &[(&str, &str)]) -> ChoiceSet {
    ChoiceSet::Keys {
        options: options
            .iter()
            .map(|(key, label)| ChoiceOption {
                key: key.to_string(),
                label: label.to_string(),
            })
            .collect(),
    }
}

/// The "잠실의 별 삼성 SDS" room.
pub fn samsung_sds_steps() -> Vec<StoryStep> {
    vec![
        StoryStep::story("intro", "일요일 아침, 따뜻한 이불 속에서 뒤척이던 중..."),
        StoryStep::story(
            "phone-call",
            "갑작스럽게 울리는 전화벨소리! 🔔\n\n'여보세요? 지금 당장 회사로 나와주세요! 긴급상황입니다!'",
        ),
        StoryStep::story(
            "rush-to-company",
            "급하게 옷을 입고 회사로 달려나왔습니다.\n잠실 삼성 SDS 타워가 보입니다...",
        )
        .with_image("/images/samsung-sds/1.png"),
        StoryStep::story(
            "security-guard",
            "회사 앞에서 보안 가드를 만났습니다.\n\n'어디 소속이십니까?'",
        ),
        StoryStep::question(
            "department-question",
            "보안 가드가 당신의 소속을 묻고 있습니다.",
            "당신은 어느 그룹 소속입니까?",
            "MSP 서비스 개발 그룹",
        )
        .with_hint("MSP는 Managed Service Provider의 줄임말입니다."),
        StoryStep::story(
            "rush-to-elevator",
            "정답입니다! 보안 가드가 고개를 끄덕이며 길을 열어줍니다.\n\n'MSP 서비스 개발 그룹이시군요. 어서 들어가세요!'\n\n당신은 급하게 엘리베이터로 달려갑니다! 🏃‍♂️💨",
        ),
        StoryStep::choice(
            "elevator-selection",
            "엘리베이터에 들어가자 층수 선택 패널이 나타났습니다.\n1층부터 30층까지... 어느 층으로 가야 할까요?",
            &ELEVATOR_TARGET_FLOOR.to_string(),
            ChoiceConfig {
                options: ChoiceSet::NumericRange {
                    min: ELEVATOR_ORIGIN_FLOOR,
                    max: ELEVATOR_TOP_FLOOR,
                },
                resolution: ResolutionDelay::Travel {
                    origin: ELEVATOR_ORIGIN_FLOOR,
                    per_unit_ms: ELEVATOR_FLOOR_STEP_MS,
                    base_ms: ELEVATOR_BASE_DELAY_MS,
                },
                award: ELEVATOR_AWARD,
                success_id: "elevator-success".to_string(),
                failure_id: "elevator-failure".to_string(),
                failure_intermediate_id: None,
            },
        ),
        StoryStep::story(
            "elevator-success",
            "축하합니다! 6층 MSP 서비스 개발 그룹 사무실에 성공적으로 도착했습니다! 🎉\n\n엘리베이터 문이 열렸습니다.\n\n당신은 급하게 자신의 자리로 향합니다...",
        ),
        StoryStep::question(
            "monitor-password",
            "컴퓨터 앞에 앉았지만 모니터가 잠겨있습니다.\n화면에 이상한 이미지가 떠 있네요... 🖥️",
            "모니터 잠금을 해제하기 위한 비밀번호를 입력하세요",
            "cloud in one",
        )
        .with_image("/images/samsung-sds/cloudinOne.png")
        .with_accepted_answers(&["cloudinone", "cloud in one", "cloudInOne"])
        .with_hint("이미지를 자세히 보세요. 영어로 무엇을 의미하는지 생각해보세요.")
        .with_next("transformation"),
        StoryStep::story(
            "transformation",
            "모니터가 켜지면서 이상한 빛이 번쩍! ✨\n\n갑자기 몸이 이상해지더니... 어? 내가 작은 인형이 되었다?! 😱",
        )
        .with_image("/images/samsung-sds/doll.png"),
        StoryStep::story(
            "look-around",
            "당황스럽지만... 침착하자! 🤖\n\n이제 인형의 몸으로 주변을 살펴봐야겠다.\n책상 위, 의자 아래, 서랍 속... 어디선가 단서를 찾을 수 있을 것이다!",
        ),
        StoryStep::choice(
            "umbrella-problem",
            "창밖에 갑자기 비가 쏟아집니다. ☔\n\n책상 옆에 우산 세 개가 놓여 있습니다. 인형이 된 몸으로 안전하게 쓸 수 있는 우산은?",
            "pink",
            ChoiceConfig {
                options: keyed(&[
                    ("pink", "핑크색 우산"),
                    ("blue", "파란색 우산"),
                    ("black", "검은색 우산"),
                ]),
                resolution: ResolutionDelay::Fixed {
                    ms: CHOICE_RESOLUTION_DELAY_MS,
                },
                award: CHOICE_AWARD,
                success_id: "umbrella-success".to_string(),
                failure_id: "umbrella-failure".to_string(),
                failure_intermediate_id: Some("umbrella-monster-encounter".to_string()),
            },
        )
        .with_hint("인형에게 어울리는 색을 떠올려 보세요."),
        StoryStep::story(
            "umbrella-success",
            "핑크색 우산을 펼치자 포근한 빛이 당신을 감쌉니다. 🌸\n\n무사히 비를 피해 탕비실로 향합니다...",
        ),
        StoryStep::choice(
            "soju-selection",
            "탕비실 냉장고 안에 소주 두 병이 있습니다. 🍶\n\n원래 모습으로 돌아가려면 어느 쪽을 골라야 할까요?",
            "original",
            ChoiceConfig {
                options: keyed(&[("fresh", "후레쉬"), ("original", "오리지널")]),
                resolution: ResolutionDelay::Fixed {
                    ms: CHOICE_RESOLUTION_DELAY_MS,
                },
                award: CHOICE_AWARD,
                success_id: "soju-success".to_string(),
                failure_id: "soju-failure".to_string(),
                failure_intermediate_id: None,
            },
        ),
        StoryStep::story(
            "soju-success",
            "오리지널을 선택하자 몸이 점점 원래대로 돌아옵니다! ✨",
        ),
        StoryStep::story(
            "final-success",
            "완벽합니다! 🎉\n\n인형이 되었지만 미션을 완료했습니다!\n\n이제 원래 모습으로 돌아갈 방법을 찾아야겠네요... 진짜 모험은 이제부터입니다!",
        )
        .with_kind(StepKind::Success),
        StoryStep::failure(
            "elevator-failure",
            "앗! 잘못된 층을 선택했습니다! 😱\n\n엘리베이터가 갑자기 멈추더니 추락하기 시작합니다...\n\n게임 오버! 다시 시도해보세요.",
            "elevator-selection",
        ),
        StoryStep::story(
            "umbrella-monster-encounter",
            "우산을 펼치는 순간... 우산이 꿈틀거립니다! 👹\n\n우산 몬스터가 당신을 덮칩니다!",
        )
        .with_next("umbrella-failure")
        .with_advance_delay(DOOM_ADVANCE_DELAY_MS),
        StoryStep::failure(
            "umbrella-failure",
            "우산 몬스터에게 잡혀버렸습니다... 😵\n\n게임 오버! 다시 시도해보세요.",
            "umbrella-problem",
        ),
        StoryStep::failure(
            "soju-failure",
            "후레쉬를 마시자 몸이 더 작아졌습니다... 🫠\n\n게임 오버! 다시 시도해보세요.",
            "soju-selection",
        ),
    ]
}
