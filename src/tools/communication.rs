//! Built-in communication tool descriptors
//!
//! These are the tools whose invocation directly produces the user-visible
//! turn output. The agent loop terminates when the model calls one of them.

use super::types::{object_schema, BuiltinTool, ToolSpec};

/// Descriptor for the `message` tool.
pub fn message_tool() -> ToolSpec {
    ToolSpec::new(
        BuiltinTool::Message.name(),
        "Send a message in the current conversation",
        object_schema(
            &[(
                "message_content",
                "string",
                "The message content to send",
            )],
            &["message_content"],
        ),
    )
}

/// Descriptor for the `react` tool.
pub fn react_tool() -> ToolSpec {
    ToolSpec::new(
        BuiltinTool::React.name(),
        "React to a message in the current conversation",
        object_schema(
            &[
                (
                    "reaction",
                    "string",
                    "The reaction to send (must be a single emoji)",
                ),
                (
                    "username",
                    "string",
                    "The username of the user who sent the message",
                ),
                (
                    "identifying_substring",
                    "string",
                    "A subset of the message content that uniquely identifies the message. \
                     Example: 'Hello, world!' -> 'world'",
                ),
            ],
            &["reaction", "username", "identifying_substring"],
        ),
    )
}

/// Descriptor for the `remove_react` tool.
pub fn remove_react_tool() -> ToolSpec {
    ToolSpec::new(
        BuiltinTool::RemoveReact.name(),
        "Remove a reaction from a message in the current conversation",
        object_schema(
            &[
                (
                    "reaction",
                    "string",
                    "The reaction to remove (must be a single emoji)",
                ),
                (
                    "username",
                    "string",
                    "The username of the user who sent the message",
                ),
                (
                    "identifying_substring",
                    "string",
                    "A subset of the message content that uniquely identifies the message. \
                     Example: 'Hello, world!' -> 'world'",
                ),
            ],
            &["reaction", "username", "identifying_substring"],
        ),
    )
}

/// Descriptor for the `do_nothing` tool.
pub fn do_nothing_tool() -> ToolSpec {
    ToolSpec::new(
        BuiltinTool::DoNothing.name(),
        "Do nothing",
        object_schema(&[], &[]),
    )
}

/// All built-in communication tool descriptors.
pub fn all_communication_tools() -> Vec<ToolSpec> {
    vec![
        do_nothing_tool(),
        message_tool(),
        react_tool(),
        remove_react_tool(),
    ]
}

/// The reduced tool set offered once the agent's turn budget is exhausted:
/// only `message` and `react`, forcing a terminating response.
pub fn terminal_tools() -> Vec<ToolSpec> {
    vec![message_tool(), react_tool()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolKind};

    #[test]
    fn test_all_communication_tools_classify_as_communication() {
        for spec in all_communication_tools() {
            assert!(matches!(
                ToolKind::classify(&spec.name),
                ToolKind::Communication(_)
            ));
        }
    }

    #[test]
    fn test_message_tool_schema() {
        let spec = message_tool();
        assert_eq!(spec.name, "message");
        assert_eq!(spec.parameters["required"][0], "message_content");
    }

    #[test]
    fn test_react_tool_requires_identifying_substring() {
        let spec = react_tool();
        let required: Vec<&str> = spec.parameters["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert!(required.contains(&"identifying_substring"));
    }

    #[test]
    fn test_do_nothing_takes_no_args() {
        let spec = do_nothing_tool();
        assert!(spec.parameters["properties"]
            .as_object()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_terminal_tools_are_message_and_react() {
        let names: Vec<String> = terminal_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["message", "react"]);
    }
}
