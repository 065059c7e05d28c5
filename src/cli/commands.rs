use crate::cert::{CaColumn, CaRecord};
use crate::chain::ChainClient;
use crate::cli::args::*;
use crate::cli::completions::{handle_completion_command, handle_completion_helper_command};
use crate::genesis::generate_testnet;
use crate::names::{can_issue, DistinguishedName, Hierarchy};
use crate::request::{prepare_request, submit_request, CertificateRequest, RequestForm};
use crate::utils::errors::{DpkiError, Result};
use crate::utils::i18n::{resolve_locale, Messages};
use crate::utils::output::{build_table_data, OutputFormat};
use crate::utils::paths::DpkiPaths;
use std::io;
use std::path::PathBuf;

pub async fn handle_command(cli: Cli) -> Result<()> {
    // Initialize logging - always to stderr
    if !cli.quiet {
        let log_level = match cli.verbose {
            0 => "dpki_rs=warn",  // Default: warnings only
            1 => "dpki_rs=info",  // -v: info level
            2 => "dpki_rs=debug", // -vv: debug level
            _ => "dpki_rs=trace", // -vvv+: trace level
        };

        tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_env_filter(log_level)
            .init();
    }

    let output = OutputFormat::new(cli.raw);
    let messages = Messages::new(resolve_locale(cli.lang.as_deref()));
    tracing::debug!("Using locale {}", messages.locale());

    match cli.command {
        Commands::Ca { ref command } => handle_ca_command(command, &cli.node, &output, &messages).await,
        Commands::Request {
            ref subject,
            ref issuer,
            template,
            ref key,
            ref output,
            path_length,
            ref san,
            check_only,
        } => {
            let request = CertificateRequest {
                subject: DistinguishedName::parse(subject)?,
                template: template.into(),
                key_file: key.clone(),
                output: output.clone(),
                path_length,
                san: san.clone(),
            };
            handle_request_command(request, issuer.as_deref(), check_only, &cli.node, &messages).await
        }
        Commands::Genesis { ref output } => {
            let testnet = generate_testnet(output)?;
            eprintln!("✓ Testnet generated at {}", testnet.root.display());
            eprintln!("Chain ID: {}", testnet.genesis.chain_id);
            for node in &testnet.nodes {
                eprintln!("  {}", testnet.root.join(node).display());
            }
            Ok(())
        }
        Commands::Node => {
            let home = node_home(cli.home.clone())?;
            crate::node::run(&home).await
        }
        Commands::Dn { ref name } => handle_dn_command(name, &output),
        Commands::Completion { ref command } => handle_completion_command(command),
        Commands::CompletionHelper { ref command } => {
            handle_completion_helper_command(command, &cli.node, &output).await
        }
    }
}

fn node_home(home: Option<PathBuf>) -> Result<PathBuf> {
    match home {
        Some(home) => Ok(home),
        None => {
            DpkiPaths::ensure_all_dirs()?;
            DpkiPaths::default_home()
        }
    }
}

/// Parse `--columns`, where a leading `+` appends to the defaults
pub fn parse_columns(columns: Option<&str>) -> Result<Vec<CaColumn>> {
    let Some(columns_str) = columns else {
        return Ok(CaColumn::DEFAULT.to_vec());
    };

    let (mut result, listed) = match columns_str.strip_prefix('+') {
        Some(rest) => (CaColumn::DEFAULT.to_vec(), rest),
        None => (Vec::new(), columns_str),
    };
    for col in listed.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        result.push(col.parse::<CaColumn>().map_err(DpkiError::InvalidInput)?);
    }
    Ok(result)
}

async fn handle_ca_command(
    command: &CaCommands,
    node: &str,
    output: &OutputFormat,
    messages: &Messages,
) -> Result<()> {
    let client = ChainClient::new(node)?;

    match command {
        CaCommands::List { columns } => {
            let columns = parse_columns(columns.as_deref())?;
            let records = client.list_ca().await?;

            if records.is_empty() {
                eprintln!("{}", messages.tr("ca.list.empty"));
                return Ok(());
            }

            let mut table = Vec::with_capacity(records.len() + 1);
            if !output.raw {
                table.push(columns.iter().map(|c| c.header().to_string()).collect());
            }
            table.extend(build_table_data(&records, &columns));
            output.print_table(&table);
            Ok(())
        }
    }
}

/// Pick the issuer: the requested one when given, else the closest CA
fn choose_issuer<'a>(
    form: &'a RequestForm,
    issuer: Option<&str>,
    subject: &DistinguishedName,
    messages: &Messages,
) -> Result<&'a CaRecord> {
    match issuer {
        Some(issuer) => {
            let record = form.select(issuer)?;
            let issuer_dn = DistinguishedName::parse(&record.subject)?;
            if can_issue(&issuer_dn, subject) == 0 {
                return Err(DpkiError::CaNotFound(messages.tr("request.no_issuer")));
            }
            Ok(record)
        }
        None => form
            .suggest(subject)
            .ok_or_else(|| DpkiError::CaNotFound(messages.tr("request.no_issuer"))),
    }
}

async fn handle_request_command(
    request: CertificateRequest,
    issuer: Option<&str>,
    check_only: bool,
    node: &str,
    messages: &Messages,
) -> Result<()> {
    let client = ChainClient::new(node)?;
    let form = RequestForm::new(client.list_ca().await?);

    for line in form.render(messages) {
        eprintln!("{line}");
    }
    if form.is_empty() {
        return Err(DpkiError::CaNotFound(messages.tr("request.no_ca")));
    }

    let selected = choose_issuer(&form, issuer, &request.subject, messages)?;
    eprintln!("> {}", selected.subject);

    let prepared = prepare_request(&request)?;
    if let Some(key_path) = &prepared.key_path {
        eprintln!("✓ Key written to {}", key_path.display());
    }
    eprintln!("✓ Request written to {}", prepared.csr_path.display());

    let result = submit_request(&client, &prepared.csr_pem, check_only).await?;
    if !result.is_ok() {
        return Err(DpkiError::Query(format!(
            "{}: {}",
            messages.tr("request.rejected"),
            result.log
        )));
    }

    let done = if check_only { "request.checked" } else { "request.submitted" };
    eprintln!("✓ {}", messages.tr(done));
    println!("{}", result.hash);
    Ok(())
}

fn handle_dn_command(name: &str, output: &OutputFormat) -> Result<()> {
    let dn = DistinguishedName::parse(name)?;
    dn.validate()?;

    let pairs: Vec<(String, String)> = Hierarchy::ALL
        .iter()
        .map(|h| {
            let part = dn
                .extract(*h, false)
                .map(|part| part.to_string())
                .unwrap_or_else(|| "-".to_string());
            (h.to_string(), part)
        })
        .collect();
    output.print_key_value(&pairs);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::i18n::Locale;

    #[test]
    fn test_parse_columns() {
        assert_eq!(parse_columns(None).unwrap(), CaColumn::DEFAULT.to_vec());
        assert_eq!(
            parse_columns(Some("issuer,subject")).unwrap(),
            vec![CaColumn::Issuer, CaColumn::Subject]
        );
        assert_eq!(
            parse_columns(Some("+issuer")).unwrap(),
            vec![CaColumn::Subject, CaColumn::PathLength, CaColumn::Issuer]
        );
        assert!(matches!(
            parse_columns(Some("serial")),
            Err(DpkiError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_choose_issuer() {
        let form = RequestForm::new(vec![CaRecord::new("CN=Wonderland main CA,C=WN")]);
        let messages = Messages::new(Locale::En);
        let subject = DistinguishedName::parse("CN=Alice, C=WN").unwrap();

        let chosen = choose_issuer(&form, None, &subject, &messages).unwrap();
        assert_eq!(chosen.subject, "CN=Wonderland main CA,C=WN");

        let stranger = DistinguishedName::parse("CN=Stranger, C=XX").unwrap();
        let err = choose_issuer(&form, None, &stranger, &messages).unwrap_err();
        assert!(err.to_string().contains("None of the available CAs"));
    }

    #[test]
    fn test_explicit_issuer_must_cover_subject() {
        let form = RequestForm::new(vec![CaRecord::new("CN=Wonderland main CA,C=WN")]);
        let messages = Messages::new(Locale::En);
        let issuer = Some("CN=Wonderland main CA,C=WN");

        let subject = DistinguishedName::parse("CN=Alice, C=WN").unwrap();
        let chosen = choose_issuer(&form, issuer, &subject, &messages).unwrap();
        assert_eq!(chosen.subject, "CN=Wonderland main CA,C=WN");

        let stranger = DistinguishedName::parse("CN=Stranger, C=XX").unwrap();
        let err = choose_issuer(&form, issuer, &stranger, &messages).unwrap_err();
        assert!(matches!(err, DpkiError::CaNotFound(_)));
        let expected = DpkiError::CaNotFound(messages.tr("request.no_issuer"));
        assert_eq!(err.to_string(), expected.to_string());
    }
}
