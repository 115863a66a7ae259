use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        join_command(),
        leave_command(),
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        stop_command(),
        loop_command(),
        nowplaying_command(),
        queue_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join")
        .description("Conecta el bot a tu canal de voz")
        .add_option(CreateCommandOption::new(
            CommandOptionType::Channel,
            "channel",
            "Canal de voz (por defecto, el tuyo)",
        ))
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}

// Reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción o playlist")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true)
            .set_autocomplete(true),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y vacía la cola")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Cambia el modo de repetición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Modo de repetición")
                .add_string_choice("Desactivado", "off")
                .add_string_choice("Canción", "track")
                .add_string_choice("Cola", "queue"),
        )
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra la canción actual")
}

// Cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Gestiona la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "list", "Muestra la cola")
                .add_sub_option(
                    CreateCommandOption::new(
                        CommandOptionType::Integer,
                        "page",
                        "Página (por defecto, la de la canción actual)",
                    )
                    .min_int_value(1),
                ),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "remove",
                "Elimina una canción de la cola",
            )
            .add_sub_option(
                CreateCommandOption::new(CommandOptionType::Integer, "index", "Posición en la cola")
                    .min_int_value(0)
                    .required(true)
                    .set_autocomplete(true),
            ),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "clear", "Vacía la cola")
                .add_sub_option(CreateCommandOption::new(
                    CommandOptionType::Boolean,
                    "keep_current",
                    "Conservar la canción actual",
                )),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "seek",
                "Salta a una posición de la cola",
            )
            .add_sub_option(
                CreateCommandOption::new(CommandOptionType::Integer, "index", "Posición en la cola")
                    .min_int_value(0)
                    .required(true)
                    .set_autocomplete(true),
            ),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "restart",
            "Vuelve al inicio de la cola",
        ))
}
