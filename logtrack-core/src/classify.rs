use crate::annotation::{AttributeMap, ReservedKey};

/// What a record asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction<'a> {
    /// Begin and/or end an activity. When both are present the end is
    /// processed first.
    Activity {
        begin: Option<&'a str>,
        end: Option<&'a str>,
    },
    /// Build and dispatch an event.
    Event,
}

/// True when the record carries an activity control key. Presence is what
/// counts: `#end=` with an empty value is a valid instruction.
pub fn is_activity_instruction(attrs: &AttributeMap) -> bool {
    attrs.contains(ReservedKey::Beg) || attrs.contains(ReservedKey::End)
}

pub fn classify(attrs: &AttributeMap) -> Instruction<'_> {
    if is_activity_instruction(attrs) {
        Instruction::Activity {
            begin: attrs.get(ReservedKey::Beg),
            end: attrs.get(ReservedKey::End),
        }
    } else {
        Instruction::Event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let parse = |m: &str| AttributeMap::parse(m, '#');

        assert_eq!(classify(&parse("plain text")), Instruction::Event);
        assert_eq!(classify(&parse("#opn=save #rcd=0")), Instruction::Event);
        assert_eq!(
            classify(&parse("#beg=Checkout #rsn=cart")),
            Instruction::Activity {
                begin: Some("Checkout"),
                end: None
            }
        );
        assert_eq!(
            classify(&parse("#end=")),
            Instruction::Activity {
                begin: None,
                end: Some("")
            }
        );
        assert!(is_activity_instruction(&parse("#END=x #BEG=y")));
        assert!(!is_activity_instruction(&parse("#begin=x")));
    }
}
