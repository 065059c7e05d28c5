use crate::chain::ChainClient;
use crate::cli::args::{Cli, CompletionCommands, CompletionHelperCommands};
use crate::utils::errors::Result;
use crate::utils::output::OutputFormat;
use clap::CommandFactory;
use clap_complete::{generate, Shell};
use std::io;

const COLUMNS: [&str; 3] = ["subject", "path_length", "issuer"];

pub fn handle_completion_command(command: &CompletionCommands) -> Result<()> {
    let shell = command.shell();
    let mut cmd = Cli::command();
    let app_name = "dpki";

    // For bash, add our custom completion enhancement first
    if matches!(shell, Shell::Bash) {
        println!("# Enhanced completion for dpki issuers and columns");
        print!(
            r#"
_dpki_complete_issuers() {{
    local IFS=$'\n'
    COMPREPLY=($(compgen -W "$(dpki completion-helper issuers 2>/dev/null)" -- "${{cur}}"))
}}

_dpki_complete_columns() {{
    local columns
    columns=$(dpki completion-helper columns 2>/dev/null)

    local current_word="${{cur}}"
    local prefix=""

    if [[ "$current_word" == +* ]]; then
        prefix="+"
        current_word="${{current_word:1}}"
    fi

    if [[ "$current_word" == *,* ]]; then
        prefix="${{prefix}}${{current_word%,*}},"
        current_word="${{current_word##*,}}"
    fi

    local word_list=""
    for col in $columns; do
        if [[ "$col" == "$current_word"* ]]; then
            word_list="$word_list ${{prefix}}${{col}}"
        fi
    done

    COMPREPLY=($(compgen -W "$word_list" -- "${{cur}}"))
}}

_dpki_override() {{
    local cur prev words cword
    _init_completion || return

    case "$prev" in
        "--issuer")
            _dpki_complete_issuers
            return 0
            ;;
        "--columns")
            _dpki_complete_columns
            return 0
            ;;
    esac

    _dpki "$@"
}}

"#
        );

        generate(shell, &mut cmd, app_name, &mut io::stdout());

        println!();
        println!("# Override the completion function");
        println!("complete -F _dpki_override dpki");
    } else {
        generate(shell, &mut cmd, app_name, &mut io::stdout());
    }

    Ok(())
}

pub async fn handle_completion_helper_command(
    command: &CompletionHelperCommands,
    node: &str,
    output: &OutputFormat,
) -> Result<()> {
    match command {
        CompletionHelperCommands::Issuers => {
            let client = ChainClient::new(node)?;
            if let Ok(records) = client.list_ca().await {
                let subjects: Vec<String> = records.into_iter().map(|r| r.subject).collect();
                output.print_list(&subjects);
            }
        }
        CompletionHelperCommands::Columns => {
            output.print_list(&COLUMNS);
        }
    }

    Ok(())
}
