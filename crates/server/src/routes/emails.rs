use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

use entrevistes_api::db::{plantilles, tutors, usuaris};
use entrevistes_api::{
    AlumneContacte, CreatePlantillaRequest, EmailEnviat, EnviarMasiuRequest, EnviarMasiuResponse, PlantillaEmail,
    PlantillaRow, ResultatEnviament, Usuari, service,
};

use crate::AppState;
use crate::email::EmailService;
use crate::error::{ApiErr, AppJson};
use crate::routes::auth::AuthUser;
use crate::storage::Db;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/plantillas", get(plantillas))
        .route("/plantilla", post(create_plantilla))
        .route("/alumnes/{tutor_email}", get(alumnes))
        .route("/enviar-masivo", post(enviar_masiu))
}

/// GET /emails/plantillas: built-in templates followed by stored ones.
pub async fn plantillas(State(db): State<Db>, _user: AuthUser) -> Json<Vec<PlantillaEmail>> {
    let mut all = service::default_plantilles();
    match db.fetch_all::<PlantillaRow>(plantilles::list()).await {
        Ok(rows) => all.extend(rows.into_iter().map(|r| PlantillaEmail {
            variables: service::template_variables(&r.contingut),
            id: r.id,
            nom: r.nom,
            contingut: r.contingut,
        })),
        Err(e) => tracing::warn!("stored templates unavailable: {e}"),
    }
    Json(all)
}

/// POST /emails/plantilla: store a new template.
pub async fn create_plantilla(
    State(db): State<Db>,
    user: AuthUser,
    AppJson(req): AppJson<CreatePlantillaRequest>,
) -> Result<(StatusCode, Json<PlantillaEmail>), ApiErr> {
    user.require_admin()?;
    let nom = req.nom.trim();
    let contingut = req.contingut.trim();
    let mut details = Vec::new();
    if nom.is_empty() {
        details.push("nom: camp requerit".to_string());
    }
    if contingut.is_empty() {
        details.push("contingut: camp requerit".to_string());
    }
    if !details.is_empty() {
        return Err(ApiErr::invalid(details));
    }

    let id = service::prefixed_id("plantilla");
    db.execute(plantilles::insert(&id, nom, contingut, &user.email))
        .await
        .map_err(|e| {
            tracing::error!("storing template {nom}: {e}");
            ApiErr::internal("Error creant plantilla")
        })?;
    let variables = req
        .variables
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| service::template_variables(contingut));
    Ok((
        StatusCode::CREATED,
        Json(PlantillaEmail {
            id,
            nom: nom.to_string(),
            contingut: contingut.to_string(),
            variables,
        }),
    ))
}

/// GET /emails/alumnes/{tutor_email}: tutees with family contacts.
pub async fn alumnes(
    State(db): State<Db>,
    user: AuthUser,
    Path(tutor_email): Path<String>,
) -> Result<Json<Vec<AlumneContacte>>, ApiErr> {
    if !user.is_admin() && !user.email.eq_ignore_ascii_case(&tutor_email) {
        return Err(ApiErr::forbidden("No tens permisos per veure aquests alumnes"));
    }
    let any_curs = db.current_year().await;
    let rows = sqlx::query_as::<_, AlumneContacte>(tutors::CONTACTES_DEL_TUTOR)
        .bind(&tutor_email)
        .bind(&any_curs)
        .fetch_all(db.pool())
        .await
        .map_err(|e| {
            tracing::error!("contacts of tutees of {tutor_email}: {e}");
            ApiErr::internal("Error obtenint alumnes")
        })?;
    Ok(Json(rows))
}

/// POST /emails/enviar-masivo: render the message for each student and send
/// it to every family contact with an email.
pub async fn enviar_masiu(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(req): AppJson<EnviarMasiuRequest>,
) -> Result<Json<EnviarMasiuResponse>, ApiErr> {
    let mut details = Vec::new();
    if service::validate_email(&req.tutor_email).is_err() {
        details.push("tutor_email: email invàlid".to_string());
    }
    if req.asunto.trim().is_empty() {
        details.push("asunto: camp requerit".to_string());
    }
    if req.contingut.trim().is_empty() {
        details.push("contingut: camp requerit".to_string());
    }
    if !details.is_empty() {
        return Err(ApiErr::invalid(details));
    }
    if !user.is_admin() && !user.email.eq_ignore_ascii_case(&req.tutor_email) {
        return Err(ApiErr::forbidden("No tens permisos per enviar emails per aquest tutor"));
    }

    let fail = |e: sqlx::Error| {
        tracing::error!("bulk email for {}: {e}", req.tutor_email);
        ApiErr::internal("Error enviant emails")
    };
    let db = &state.db;
    let any_curs = db.current_year().await;
    let alumnes = sqlx::query_as::<_, AlumneContacte>(tutors::CONTACTES_PER_IDS)
        .bind(&req.alumne_ids)
        .bind(&any_curs)
        .fetch_all(db.pool())
        .await
        .map_err(fail)?;
    let tutor = db
        .fetch_optional::<Usuari>(usuaris::get(&req.tutor_email.trim().to_lowercase()))
        .await
        .map_err(fail)?
        .ok_or_else(|| ApiErr::not_found("Tutor no trobat"))?;

    let (resultats, emails_enviats) = deliver(&state.email, &req, &tutor, &alumnes);
    tracing::info!(
        tutor = %tutor.email,
        alumnes = alumnes.len(),
        emails = emails_enviats.len(),
        "bulk email processed"
    );
    Ok(Json(EnviarMasiuResponse {
        message: "Emails processats".into(),
        total_alumnes: alumnes.len(),
        total_emails: emails_enviats.len(),
        resultats,
        emails_enviats,
    }))
}

/// Family contacts with an email, named `Tutor/a N` when the name is blank.
fn destinataris(a: &AlumneContacte) -> Vec<(String, String)> {
    [
        (&a.tutor1_email, &a.tutor1_nom, "Tutor/a 1"),
        (&a.tutor2_email, &a.tutor2_nom, "Tutor/a 2"),
    ]
    .into_iter()
    .filter_map(|(email, nom, default)| {
        let email = email.as_deref().map(str::trim).filter(|e| !e.is_empty())?;
        let nom = nom
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(default);
        Some((email.to_string(), nom.to_string()))
    })
    .collect()
}

fn deliver(
    email: &EmailService,
    req: &EnviarMasiuRequest,
    tutor: &Usuari,
    alumnes: &[AlumneContacte],
) -> (Vec<ResultatEnviament>, Vec<EmailEnviat>) {
    let mut resultats = Vec::with_capacity(alumnes.len());
    let mut enviats = Vec::new();
    for alumne in alumnes {
        let mut vars: HashMap<String, String> = req.variables.clone();
        vars.insert("nom_alumne".into(), alumne.nom.clone());
        vars.insert("tutor_nom".into(), tutor.nom.clone().unwrap_or_default());
        vars.insert("tutor_email".into(), tutor.email.clone());
        let body = service::render_template(&req.contingut, &vars);

        let destinataris = destinataris(alumne);
        for (to, nom) in &destinataris {
            email.send(to, &req.asunto, &body);
            enviats.push(EmailEnviat {
                to: to.clone(),
                subject: req.asunto.clone(),
                body: body.clone(),
                alumne: alumne.nom.clone(),
                destinatario: nom.clone(),
            });
        }
        resultats.push(ResultatEnviament {
            alumne_id: alumne.alumne_id.clone(),
            alumne_nom: alumne.nom.clone(),
            emails: destinataris.len(),
            estat: if destinataris.is_empty() {
                "sense_destinataris".into()
            } else {
                "enviat".into()
            },
        });
    }
    (resultats, enviats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::{body_json, error_of, get, json, send};

    const DOCENT: &str = "docent@insbitacola.cat";

    fn alumne(tutor1: Option<&str>, tutor2: Option<&str>) -> AlumneContacte {
        AlumneContacte {
            alumne_id: "a1".into(),
            nom: "Anna Puig".into(),
            grup: Some("1A".into()),
            tutor1_nom: Some("Maria".into()),
            tutor1_tel: None,
            tutor1_email: tutor1.map(Into::into),
            tutor2_nom: None,
            tutor2_tel: None,
            tutor2_email: tutor2.map(Into::into),
        }
    }

    fn request() -> EnviarMasiuRequest {
        EnviarMasiuRequest {
            tutor_email: DOCENT.into(),
            alumne_ids: vec!["a1".into()],
            plantilla_id: None,
            asunto: "Reunió".into(),
            contingut: "Famílies de {{nom_alumne}}: {{motiu}}. {{tutor_nom}}".into(),
            variables: HashMap::from([("motiu".to_string(), "tutoria".to_string())]),
        }
    }

    #[test]
    fn blank_contact_names_get_defaults() {
        let to = destinataris(&alumne(Some("m@x.cat"), Some("p@x.cat")));
        assert_eq!(
            to,
            vec![
                ("m@x.cat".to_string(), "Maria".to_string()),
                ("p@x.cat".to_string(), "Tutor/a 2".to_string()),
            ]
        );
        assert!(destinataris(&alumne(None, Some(" "))).is_empty());
    }

    #[test]
    fn messages_are_rendered_per_student() {
        let tutor = Usuari {
            email: DOCENT.into(),
            rol: "docent".into(),
            nom: Some("Joan".into()),
        };
        let (resultats, enviats) = deliver(
            &EmailService::new("noreply@insbitacola.cat"),
            &request(),
            &tutor,
            &[alumne(Some("m@x.cat"), None), alumne(None, None)],
        );
        assert_eq!(enviats.len(), 1);
        assert_eq!(enviats[0].body, "Famílies de Anna Puig: tutoria. Joan");
        assert_eq!(enviats[0].destinatario, "Maria");
        assert_eq!(resultats[0].estat, "enviat");
        assert_eq!(resultats[1].emails, 0);
        assert_eq!(resultats[1].estat, "sense_destinataris");
    }

    #[tokio::test]
    async fn templates_fall_back_to_builtins() {
        let resp = send(AppState::for_tests(true), get("/emails/plantillas", Some(DOCENT))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body.as_array().unwrap().len(), 3);
        assert_eq!(body[0]["id"], "plantilla_1");
    }

    #[tokio::test]
    async fn sending_for_another_tutor_is_forbidden() {
        let req = json(
            "POST",
            "/emails/enviar-masivo",
            Some(DOCENT),
            serde_json::json!({
                "tutor_email": "altre@insbitacola.cat",
                "alumne_ids": ["a1"],
                "asunto": "Hola",
                "contingut": "Bon dia"
            }),
        );
        let (status, msg) = error_of(send(AppState::for_tests(true), req).await).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(msg, "No tens permisos per enviar emails per aquest tutor");
    }
}
