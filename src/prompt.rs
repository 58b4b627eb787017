//! Prompt assembly: the fixed preamble plus the per-iteration block.

use crate::history::HistoryLog;

const PROMPT_INTRO: &str = r#"You are an agent controlling a GUI application on a set-top-box or TV. You are given:

1. An objective that you are trying to achieve.
2. A simplified text description of the current visible page (more on this below).
3. The valid commands that you can issue from the current page, as Python method signatures.
4. The previous pages you saw and the outcome of each command you issued to get to this page (in the order seen/issued, i.e. most recent last).

The description of the current page is in Python syntax: It's the Python repr of a class that models that page of the application. These classes are called "PageObjects". The fully-qualified name of the class shows the app and the type of page; the properties of the class contain information extracted from the page. For example:

    <appletv.Carousel(carousel_name='Top Movies', selected_title='Godzilla vs. Kong')>

Additionally, you can issue the following commands from any page:

1. press("key_name"), where key_name can be "KEY_DOWN", "KEY_UP", "KEY_RIGHT", "KEY_LEFT", "KEY_OK", or "KEY_BACK".
2. launch_app("app_name")
3. print(page.property), where "page" is a Python variable that is already set to an instance of the PageObject for the current visible page, and "property" is the name of a property of that PageObject.
4. assert page.property == some_value

Based on your given objective, issue whatever command you believe will get you closest to achieving your goal.

Your inputs follow. Reply with your next command.

"#;

/// Build the per-iteration block. This is what verbose mode echoes; the
/// model gets it with the preamble in front (see [`with_intro`]).
///
/// Command signatures and history lines are indented four spaces under their
/// headings. The block ends with `YOUR COMMAND:` so the completion starts
/// right where the command should go.
pub fn build_block(
    objective: &str,
    page_description: &str,
    signatures: &[String],
    history: &HistoryLog,
) -> String {
    let commands = indent_block(signatures);
    let previous = indent_block(&history.rendered_lines());
    format!(
        "OBJECTIVE: {objective}\nCURRENT PAGE: {page_description}\nCOMMANDS:\n{commands}\nHISTORY:\n{previous}\nYOUR COMMAND:"
    )
}

/// The full prompt sent to the model.
pub fn with_intro(block: &str) -> String {
    format!("{PROMPT_INTRO}{block}")
}

fn indent_block(lines: &[String]) -> String {
    lines
        .iter()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
