/*!
 * s3tool CLI - Command line interface
 */

use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use clap::{Parser, Subcommand};

use s3tool::client::StoreClient;
use s3tool::config::ClientConfigBuilder;
use s3tool::error::{Result, StoreError};
use s3tool::logging::init_logging;
use s3tool::options::{CopyOptionsBuilder, DownloadOptionsBuilder, ListOptions, UploadOptionsBuilder};
use s3tool::store::types::{CannedAcl, StorageClass};
use s3tool::uri::parse_object_uri;
use s3tool::VERSION;

#[derive(Parser)]
#[command(name = "s3tool")]
#[command(version = VERSION)]
#[command(about = "Chunked, parallel, encrypted transfers for S3-compatible object stores", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// AWS region
    #[arg(long, global = true)]
    region: Option<String>,

    /// Custom endpoint URL (MinIO, LocalStack, ...)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Force path-style addressing (required by some S3-compatible services)
    #[arg(long, global = true)]
    path_style: bool,

    /// Chunk size in bytes for multipart transfers
    #[arg(long, global = true)]
    chunk_size: Option<u64>,

    /// Number of attempts for retried operations
    #[arg(long, global = true)]
    retry: Option<u32>,

    /// Retry client (4xx) errors too
    #[arg(long, global = true)]
    retry_client_errors: bool,

    /// Directory holding encryption key pairs (default: ~/.s3lib-keys)
    #[arg(long, global = true)]
    key_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file or directory to the store
    Upload {
        /// Local file or directory
        source: PathBuf,

        /// Destination URI (s3://bucket/key)
        dest: String,

        /// Encrypt under this key pair name
        #[arg(long)]
        key: Option<String>,

        /// Canned ACL for the uploaded object(s)
        #[arg(long, default_value = "bucket-owner-full-control")]
        acl: String,

        /// Storage class for the uploaded object(s) (e.g. STANDARD_IA)
        #[arg(long)]
        storage_class: Option<String>,

        /// Upload a directory recursively
        #[arg(short = 'R', long)]
        recursive: bool,
    },

    /// Download an object or prefix from the store
    Download {
        /// Source URI (s3://bucket/key[?versionId=...])
        source: String,

        /// Local file or directory
        dest: PathBuf,

        /// Download a prefix recursively
        #[arg(short = 'R', long)]
        recursive: bool,

        /// Replace existing local files
        #[arg(long)]
        overwrite: bool,
    },

    /// Copy an object within the store
    Copy {
        /// Source URI
        source: String,

        /// Destination URI
        dest: String,

        /// Canned ACL for the destination object
        #[arg(long, default_value = "bucket-owner-full-control")]
        acl: String,
    },

    /// List buckets, or objects under a prefix
    Ls {
        /// URI to list (s3://bucket/prefix); omit to list buckets
        uri: Option<String>,

        /// Descend past '/' boundaries
        #[arg(short = 'R', long)]
        recursive: bool,
    },

    /// Delete an object
    Rm {
        /// Object URI
        uri: String,
    },

    /// Check whether an object exists (exit code 1 if not)
    Exists {
        /// Object URI
        uri: String,
    },

    /// Total stored size of objects under a prefix
    Du {
        /// Prefix URI
        uri: String,
    },

    /// List in-progress multipart uploads under a prefix
    ListPendingUploads {
        /// Prefix URI
        uri: String,
    },

    /// Abort an in-progress multipart upload
    AbortPendingUpload {
        /// Object URI
        uri: String,

        /// Upload ID of the session to abort
        #[arg(long)]
        upload_id: String,
    },

    /// Add a key wrapping to an encrypted object
    AddEncryptedKey {
        /// Object URI
        uri: String,

        /// Key pair name to add
        #[arg(long)]
        key: String,
    },

    /// Remove a key wrapping from an encrypted object
    RemoveEncryptedKey {
        /// Object URI
        uri: String,

        /// Key pair name to remove
        #[arg(long)]
        key: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut builder = ClientConfigBuilder::new();
    if let Some(region) = cli.region.clone() {
        builder = builder.region(region);
    }
    if let Some(endpoint) = cli.endpoint.clone() {
        builder = builder.endpoint(endpoint);
    }
    if cli.path_style {
        builder = builder.force_path_style(true);
    }
    if let Some(chunk_size) = cli.chunk_size {
        builder = builder.chunk_size(chunk_size);
    }
    if let Some(retry) = cli.retry {
        builder = builder.retry_attempts(retry);
    }
    if cli.retry_client_errors {
        builder = builder.retry_client_errors(true);
    }
    if let Some(key_dir) = &cli.key_dir {
        builder = builder.key_directory(key_dir);
    }
    let config = builder.build()?;
    let chunk_size = config.chunk_size;
    let client = StoreClient::new(config).await?;

    match cli.command {
        Commands::Upload {
            source,
            dest,
            key,
            acl,
            storage_class,
            recursive,
        } => {
            let dest = parse_object_uri(&dest)?;
            let mut options = UploadOptionsBuilder::new(&source, dest, chunk_size)
                .acl(CannedAcl::from_str(&acl)?);
            if let Some(key) = key {
                options = options.enc_key(key);
            }
            if let Some(sc) = storage_class {
                options = options.storage_class(StorageClass::from_str(&sc)?);
            }
            let options = options.build()?;

            if recursive || source.is_dir() {
                let files = client.upload_directory(options).await?;
                println!("uploaded {} file(s)", files.len());
            } else {
                let file = client.upload(options).await?;
                println!(
                    "uploaded s3://{}/{} (etag {})",
                    file.bucket,
                    file.key,
                    file.etag.as_deref().unwrap_or("-")
                );
            }
        }

        Commands::Download {
            source,
            dest,
            recursive,
            overwrite,
        } => {
            let source = parse_object_uri(&source)?;
            let options = DownloadOptionsBuilder::new(source, &dest)
                .overwrite(overwrite)
                .build()?;

            if recursive {
                let files = client.download_directory(options).await?;
                println!("downloaded {} file(s)", files.len());
            } else {
                let file = client.download(options).await?;
                println!(
                    "downloaded s3://{}/{} ({} bytes)",
                    file.bucket,
                    file.key,
                    file.size.unwrap_or(0)
                );
            }
        }

        Commands::Copy { source, dest, acl } => {
            let options = CopyOptionsBuilder::new(parse_object_uri(&source)?, parse_object_uri(&dest)?)
                .acl(CannedAcl::from_str(&acl)?)
                .build()?;
            let file = client.copy(options).await?;
            println!(
                "copied to s3://{}/{} (etag {})",
                file.bucket,
                file.key,
                file.etag.as_deref().unwrap_or("-")
            );
        }

        Commands::Ls { uri, recursive } => match uri {
            Some(uri) => {
                let target = parse_object_uri(&uri)?;
                let options = ListOptions::new(target.bucket, target.key)?.recursive(recursive);
                let result = client.list(options).await?;
                for prefix in &result.common_prefixes {
                    println!("{:>12}  {}", "DIR", prefix);
                }
                for obj in &result.objects {
                    println!("{:>12}  {}", obj.size, obj.key);
                }
            }
            None => {
                for bucket in client.list_buckets().await? {
                    println!("s3://{}", bucket);
                }
            }
        },

        Commands::Rm { uri } => {
            let target = parse_object_uri(&uri)?;
            client.delete(&target).await?;
            println!("deleted {}", target);
        }

        Commands::Exists { uri } => {
            let target = parse_object_uri(&uri)?;
            match client.exists(&target).await? {
                Some(head) => println!("{} exists ({} bytes stored)", target, head.size),
                None => return Err(StoreError::Usage(format!("object not found: {}", target))),
            }
        }

        Commands::Du { uri } => {
            let target = parse_object_uri(&uri)?;
            let options = ListOptions::new(target.bucket, target.key)?.recursive(true);
            let result = client.list(options).await?;
            let total: u64 = result.objects.iter().map(|o| o.size).sum();
            println!("{} bytes in {} object(s)", total, result.objects.len());
        }

        Commands::ListPendingUploads { uri } => {
            let target = parse_object_uri(&uri)?;
            let pending = client.list_pending_uploads(&target.bucket, &target.key).await?;
            for upload in &pending {
                println!("{}  s3://{}/{}", upload.upload_id, target.bucket, upload.key);
            }
            if pending.is_empty() {
                println!("no pending uploads");
            }
        }

        Commands::AbortPendingUpload { uri, upload_id } => {
            let target = parse_object_uri(&uri)?;
            client
                .abort_pending_upload(&target.bucket, &target.key, &upload_id)
                .await?;
            println!("aborted upload {} of {}", upload_id, target);
        }

        Commands::AddEncryptedKey { uri, key } => {
            let target = parse_object_uri(&uri)?;
            client.add_encrypted_key(&target, &key).await?;
            println!("added key '{}' to {}", key, target);
        }

        Commands::RemoveEncryptedKey { uri, key } => {
            let target = parse_object_uri(&uri)?;
            client.remove_encrypted_key(&target, &key).await?;
            println!("removed key '{}' from {}", key, target);
        }
    }

    Ok(())
}
